//! Writing out the validated payload.
//!
//! Used by the one-shot `vrps` command. Router keys are not part of
//! these listings; they only travel via RTR.

use std::{fs, io};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use log::error;
use tempfile::NamedTempFile;
use crate::error::Failed;
use crate::payload::PayloadSnapshot;


//------------ OutputFormat --------------------------------------------------

/// The output format for VRPs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// A CSV file with one VRP per line.
    Csv,

    /// The JSON format used by most relying party implementations.
    Json,

    /// No output at all.
    None,
}

impl OutputFormat {
    pub const VALUES: &'static [&'static str] = &["csv", "json", "none"];

    /// Writes a snapshot in this format to a writer.
    pub fn output<W: io::Write>(
        self,
        snapshot: &PayloadSnapshot,
        target: &mut W,
    ) -> Result<(), io::Error> {
        match self {
            OutputFormat::Csv => self.output_csv(snapshot, target),
            OutputFormat::Json => self.output_json(snapshot, target),
            OutputFormat::None => Ok(()),
        }
    }

    fn output_csv<W: io::Write>(
        self,
        snapshot: &PayloadSnapshot,
        target: &mut W,
    ) -> Result<(), io::Error> {
        writeln!(target, "ASN,IP Prefix,Max Length,Trust Anchor")?;
        for (origin, info) in snapshot.origins() {
            writeln!(
                target, "{},{},{},{}",
                origin.as_id(),
                origin.prefix(),
                origin.max_length(),
                info.source_name(),
            )?;
        }
        Ok(())
    }

    fn output_json<W: io::Write>(
        self,
        snapshot: &PayloadSnapshot,
        target: &mut W,
    ) -> Result<(), io::Error> {
        writeln!(target, "{{\n  \"roas\": [")?;
        let mut first = true;
        for (origin, info) in snapshot.origins() {
            if !first {
                writeln!(target, ",")?;
            }
            first = false;
            write!(
                target,
                "    {{ \"asn\": \"{}\", \"prefix\": \"{}\", \
                 \"maxLength\": {}, \"ta\": \"{}\" }}",
                origin.as_id(),
                origin.prefix(),
                origin.max_length(),
                info.source_name(),
            )?;
        }
        if !first {
            writeln!(target)?;
        }
        writeln!(target, "  ]\n}}")
    }

    /// Writes a snapshot to the given file, atomically.
    ///
    /// The data goes into a temporary file next to the target first so
    /// a crash mid-write never leaves a half-finished listing behind.
    pub fn output_to_file(
        self,
        snapshot: &PayloadSnapshot,
        path: &Path,
    ) -> Result<(), Failed> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        if let Err(err) = fs::create_dir_all(dir) {
            error!(
                "Failed to create output directory {}: {}",
                dir.display(), err
            );
            return Err(Failed)
        }
        let mut file = match NamedTempFile::new_in(dir) {
            Ok(file) => file,
            Err(err) => {
                error!("Failed to create temporary output file: {}", err);
                return Err(Failed)
            }
        };
        if let Err(err) = self.output(snapshot, &mut file) {
            error!(
                "Failed to write output file {}: {}",
                path.display(), err
            );
            return Err(Failed)
        }
        if let Err(err) = file.flush() {
            error!(
                "Failed to write output file {}: {}",
                path.display(), err
            );
            return Err(Failed)
        }
        if let Err(err) = file.persist(path) {
            error!(
                "Failed to move output file into place: {}", err
            );
            return Err(Failed)
        }
        Ok(())
    }

    /// Writes a snapshot to stdout.
    pub fn output_to_stdout(
        self,
        snapshot: &PayloadSnapshot,
    ) -> Result<(), Failed> {
        let out = io::stdout();
        let mut out = out.lock();
        self.output(snapshot, &mut out).map_err(|err| {
            error!("Failed to write output: {}", err);
            Failed
        })
    }
}

impl FromStr for OutputFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "none" => Ok(OutputFormat::None),
            _ => Err(())
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn csv_empty_snapshot() {
        let snapshot = PayloadSnapshot::default();
        let mut out = Vec::new();
        OutputFormat::Csv.output(&snapshot, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ASN,IP Prefix,Max Length,Trust Anchor\n"
        );
    }

    #[test]
    fn json_empty_snapshot_is_valid_json() {
        let snapshot = PayloadSnapshot::default();
        let mut out = Vec::new();
        OutputFormat::Json.output(&snapshot, &mut out).unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&out).unwrap();
        assert!(value["roas"].as_array().unwrap().is_empty());
    }
}
