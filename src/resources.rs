//! IP and AS resources for RPKI certificates.
//!
//! The types herein are defined in RFC 3779 for use with certificates in
//! general. RFC 6487 specifies how to use them with RPKI certificates. In
//! particular, it prohibits the use of Subsequent AFI values for address
//! families, making them always 16 bit, and prohibits RDI values for AS
//! resources. If the "inherit" value is not used for a family, the set of
//! resources must be non-empty.
//!
//! Resource sets are kept in canonical form: sorted vectors of disjoint
//! ranges with adjacent and overlapping entries merged. The parse-side
//! choice types ([`IpResources`], [`AsResources`]) may carry the inherit
//! marker instead of literal blocks; it is resolved against the issuer
//! exactly once during certificate validation and only literal sets are
//! kept thereafter.

use std::{cmp, fmt};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use bcder::decode;
use bcder::{OctetString, Tag};
use crate::x509::ValidationError;


//------------ AddressFamily -------------------------------------------------

/// The address family of an IP resource block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        let str = OctetString::take_from(cons)?;
        let mut octets = str.octets();
        let first = match octets.next() {
            Some(first) => first,
            None => return Err(decode::Error::Malformed.into())
        };
        let second = match octets.next() {
            Some(second) => second,
            None => return Err(decode::Error::Malformed.into())
        };
        if octets.next().is_some() {
            return Err(decode::Error::Malformed.into())
        }
        match (first, second) {
            (0, 1) => Ok(AddressFamily::Ipv4),
            (0, 2) => Ok(AddressFamily::Ipv6),
            _ => Err(decode::Error::Malformed.into()),
        }
    }

    /// The length of an address of this family in bits.
    pub fn bit_len(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }
}


//------------ AddressRange --------------------------------------------------

/// A consecutive range of IP addresses.
///
/// RFC 3779 encodes resources either as a single prefix or as a range.
/// Both cover a consecutive range of addresses, so we model both as a
/// range of a minimum and maximum address. Since all values are derived
/// from prefixes, we can use the same type for both IPv4 and IPv6 by
/// using 128 bit addresses in either case and using only the upper 32
/// bits for IPv4.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressRange {
    min: u128,
    max: u128,
}

impl AddressRange {
    /// Creates a new range. `min` must not be greater than `max`.
    pub fn new(min: u128, max: u128) -> Self {
        assert!(min <= max);
        AddressRange { min, max }
    }

    pub fn min(self) -> u128 {
        self.min
    }

    pub fn max(self) -> u128 {
        self.max
    }

    /// Returns whether this range fully covers `other`.
    pub fn covers(self, other: AddressRange) -> bool {
        self.min <= other.min && self.max >= other.max
    }

    /// Returns whether the ranges overlap or touch.
    fn is_mergeable(self, other: AddressRange) -> bool {
        !(
            (other.max < self.min && self.min - other.max > 1)
            || (self.max < other.min && other.min - self.max > 1)
        )
    }

    /// Merges two overlapping or adjacent ranges.
    fn merge(self, other: AddressRange) -> AddressRange {
        AddressRange::new(
            cmp::min(self.min, other.min),
            cmp::max(self.max, other.max)
        )
    }
}

impl AddressRange {
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, S::Err> {
        if let Some(range) = cons.take_opt_primitive_if(
            Tag::BIT_STRING, Self::from_prefix_bits
        )? {
            return Ok(Some(range))
        }
        cons.take_opt_sequence(|cons| {
            Ok(AddressRange {
                min: cons.take_primitive_if(Tag::BIT_STRING, |prim| {
                    Self::min_from_bits(prim)
                })?,
                max: cons.take_primitive_if(Tag::BIT_STRING, |prim| {
                    Self::max_from_bits(prim)
                })?,
            })
        })
    }

    /// Parses a range from a single prefix bit string.
    fn from_prefix_bits<S: decode::Source>(
        prim: &mut decode::Primitive<S>
    ) -> Result<Self, S::Err> {
        let bits = Bits::from_primitive(prim)?;
        Ok(AddressRange {
            min: bits.min_address()?,
            max: bits.max_address()?,
        })
    }

    fn min_from_bits<S: decode::Source>(
        prim: &mut decode::Primitive<S>
    ) -> Result<u128, S::Err> {
        Bits::from_primitive(prim)?.min_address().map_err(Into::into)
    }

    fn max_from_bits<S: decode::Source>(
        prim: &mut decode::Primitive<S>
    ) -> Result<u128, S::Err> {
        Bits::from_primitive(prim)?.max_address().map_err(Into::into)
    }
}


//------------ Bits ----------------------------------------------------------

/// The raw content of an IPAddress bit string.
struct Bits {
    octets: Vec<u8>,
    unused: u8,
}

impl Bits {
    fn from_primitive<S: decode::Source>(
        prim: &mut decode::Primitive<S>
    ) -> Result<Self, S::Err> {
        let content = prim.take_all()?;
        let (unused, octets) = match content.split_first() {
            Some((unused, octets)) => (*unused, octets.to_vec()),
            None => return Err(decode::Error::Malformed.into())
        };
        if unused > 7 || octets.len() > 16
            || (octets.is_empty() && unused != 0)
        {
            return Err(decode::Error::Malformed.into())
        }
        Ok(Bits { octets, unused })
    }

    /// The value with the unused bits cleared, shifted up to 128 bits.
    fn min_address(&self) -> Result<u128, decode::Error> {
        if self.octets.is_empty() {
            return Ok(0)
        }
        let (addr, mask) = self.to_bits()?;
        let addr = addr & !mask;
        Ok(addr << ((16 - self.octets.len()) * 8))
    }

    /// The value with the unused bits set and trailing bits filled.
    fn max_address(&self) -> Result<u128, decode::Error> {
        if self.octets.is_empty() {
            return Ok(!0)
        }
        let (addr, mask) = self.to_bits()?;
        let mut addr = addr | mask;
        for _ in self.octets.len()..16 {
            addr = addr << 8 | 0xFF
        }
        Ok(addr)
    }

    fn to_bits(&self) -> Result<(u128, u128), decode::Error> {
        let mut addr = 0u128;
        for &octet in &self.octets {
            addr = (addr << 8) | u128::from(octet)
        }
        let mut mask = 0u128;
        for _ in 0..self.unused {
            mask = mask << 1 | 0x01;
        }
        Ok((addr, mask))
    }
}


//------------ IpBlocks ------------------------------------------------------

/// A set of IP addresses of one family in canonical form.
///
/// The ranges are sorted in increasing order and neither overlap nor
/// touch. All operations preserve this invariant.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IpBlocks(Vec<AddressRange>);

impl IpBlocks {
    /// Creates an empty set.
    pub fn empty() -> Self {
        IpBlocks(Vec::new())
    }

    /// Creates a set from an iterator over ranges.
    ///
    /// Sorts once and coalesces mergeable neighbors in a single pass.
    pub fn from_ranges<I: IntoIterator<Item = AddressRange>>(
        iter: I
    ) -> Self {
        let mut ranges: Vec<_> = iter.into_iter().collect();
        ranges.sort_by_key(|range| range.min());
        let mut res = Vec::with_capacity(ranges.len());
        for range in ranges {
            match res.last_mut() {
                Some(last) if range.is_mergeable(*last) => {
                    *last = last.merge(range)
                }
                _ => res.push(range)
            }
        }
        IpBlocks(res)
    }

    /// Inserts a single range, merging on overlap.
    pub fn push(&mut self, range: AddressRange) {
        let idx = self.0.partition_point(|item| item.max < range.min);
        let mut merged = range;
        let mut end = idx;
        while end < self.0.len() && merged.is_mergeable(self.0[end]) {
            merged = merged.merge(self.0[end]);
            end += 1;
        }
        if idx > 0 && merged.is_mergeable(self.0[idx - 1]) {
            self.0[idx - 1] = self.0[idx - 1].merge(merged);
            self.0.drain(idx..end);
        }
        else {
            self.0.splice(idx..end, Some(merged));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AddressRange> + '_ {
        self.0.iter().cloned()
    }

    /// Returns whether this set covers all of `other`.
    ///
    /// Both sets are in increasing order, so a two-pointer sweep over
    /// both suffices.
    pub fn contains(&self, other: &IpBlocks) -> bool {
        let mut siter = self.0.iter();
        let mut sas = match siter.next() {
            Some(sas) => sas,
            None => return other.0.is_empty()
        };
        for oas in &other.0 {
            loop {
                if oas.min < sas.min {
                    return false
                }
                else if oas.min > sas.max {
                    sas = match siter.next() {
                        Some(sas) => sas,
                        None => return false
                    };
                }
                else if oas.max > sas.max {
                    return false
                }
                else {
                    break
                }
            }
        }
        true
    }

    /// Returns whether the set covers the given range.
    pub fn contains_range(&self, min: u128, max: u128) -> bool {
        let idx = self.0.partition_point(|item| item.max < min);
        match self.0.get(idx) {
            Some(range) => range.min <= min && range.max >= max,
            None => false
        }
    }

    /// Returns the union of the two sets.
    pub fn union(&self, other: &IpBlocks) -> IpBlocks {
        IpBlocks::from_ranges(self.iter().chain(other.iter()))
    }

    /// Returns the intersection of the two sets.
    pub fn intersection(&self, other: &IpBlocks) -> IpBlocks {
        let mut res = Vec::new();
        let mut siter = self.0.iter().peekable();
        let mut oiter = other.0.iter().peekable();
        while let (Some(&&s), Some(&&o)) = (siter.peek(), oiter.peek()) {
            let min = cmp::max(s.min, o.min);
            let max = cmp::min(s.max, o.max);
            if min <= max {
                res.push(AddressRange::new(min, max));
            }
            if s.max <= o.max {
                siter.next();
            }
            else {
                oiter.next();
            }
        }
        IpBlocks(res)
    }

    /// Returns everything in `self` that is not in `other`.
    pub fn difference(&self, other: &IpBlocks) -> IpBlocks {
        let mut res = Vec::new();
        let mut oiter = other.0.iter().peekable();
        for &s in &self.0 {
            let mut min = s.min;
            loop {
                // Skip blocks entirely below the remaining piece.
                while let Some(&&o) = oiter.peek() {
                    if o.max < min {
                        oiter.next();
                    }
                    else {
                        break
                    }
                }
                match oiter.peek() {
                    Some(&&o) if o.min <= s.max => {
                        if o.min > min {
                            res.push(AddressRange::new(min, o.min - 1));
                        }
                        if o.max >= s.max {
                            break
                        }
                        min = o.max + 1;
                    }
                    _ => {
                        res.push(AddressRange::new(min, s.max));
                        break
                    }
                }
            }
        }
        IpBlocks(res)
    }
}


//------------ IpChoice ------------------------------------------------------

/// The value of an address family in the IP resources extension.
#[derive(Clone, Debug)]
pub enum IpChoice {
    Inherit,
    Blocks(IpBlocks),
}

impl IpChoice {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_value(|tag, content| {
            if tag == Tag::NULL {
                content.to_null()?;
                Ok(IpChoice::Inherit)
            }
            else if tag == Tag::SEQUENCE {
                let cons = content.as_constructed()?;
                let mut ranges = Vec::new();
                while let Some(range) = AddressRange::take_opt_from(cons)? {
                    ranges.push(range)
                }
                if ranges.is_empty() {
                    return Err(decode::Error::Malformed.into())
                }
                Ok(IpChoice::Blocks(IpBlocks::from_ranges(ranges)))
            }
            else {
                Err(decode::Error::Malformed.into())
            }
        })
    }

    pub fn is_inherited(&self) -> bool {
        matches!(*self, IpChoice::Inherit)
    }
}


//------------ IpResources ---------------------------------------------------

/// The IP resources extension of a certificate.
#[derive(Clone, Debug)]
pub struct IpResources {
    v4: Option<IpChoice>,
    v6: Option<IpChoice>,
}

impl IpResources {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let mut v4 = None;
            let mut v6 = None;
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let af = AddressFamily::take_from(cons)?;
                match af {
                    AddressFamily::Ipv4 => {
                        if v4.is_some() {
                            return Err(decode::Error::Malformed.into())
                        }
                        v4 = Some(IpChoice::take_from(cons)?);
                    }
                    AddressFamily::Ipv6 => {
                        if v6.is_some() {
                            return Err(decode::Error::Malformed.into())
                        }
                        v6 = Some(IpChoice::take_from(cons)?);
                    }
                }
                Ok(())
            })? { }
            if v4.is_none() && v6.is_none() {
                return Err(decode::Error::Malformed.into())
            }
            Ok(IpResources { v4, v6 })
        })
    }

    pub fn v4(&self) -> Option<&IpChoice> {
        self.v4.as_ref()
    }

    pub fn v6(&self) -> Option<&IpChoice> {
        self.v6.as_ref()
    }
}


//------------ AsId ----------------------------------------------------------

/// An AS number.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AsId(u32);

impl AsId {
    pub fn into_u32(self) -> u32 {
        self.0
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_primitive_if(Tag::INTEGER, |prim| {
            let bytes = prim.take_all()?;
            match parse_unsigned_u32(bytes.as_ref()) {
                Some(value) => Ok(AsId(value)),
                None => Err(decode::Error::Malformed.into())
            }
        })
    }
}

impl From<u32> for AsId {
    fn from(value: u32) -> AsId {
        AsId(value)
    }
}

impl From<AsId> for u32 {
    fn from(value: AsId) -> u32 {
        value.0
    }
}

impl FromStr for AsId {
    type Err = <u32 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = if s.len() > 2 && s[..2].eq_ignore_ascii_case("as") {
            &s[2..]
        }
        else {
            s
        };
        u32::from_str(s).map(AsId)
    }
}

impl fmt::Display for AsId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}


//------------ AsBlock -------------------------------------------------------

/// A half-open range of AS numbers `[start, end)`.
///
/// A block of width one represents a single AS number. The bounds are
/// kept as 64 bit values so that a range ending at the largest AS number
/// remains representable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AsBlock {
    start: u64,
    end: u64,
}

impl AsBlock {
    /// Creates a block covering a single AS number.
    pub fn single(id: AsId) -> Self {
        AsBlock {
            start: u64::from(id.0),
            end: u64::from(id.0) + 1,
        }
    }

    /// Creates a block from an inclusive range of AS numbers.
    pub fn range(min: AsId, max: AsId) -> Result<Self, ValidationError> {
        if min.0 > max.0 {
            return Err(ValidationError::Invalid)
        }
        Ok(AsBlock {
            start: u64::from(min.0),
            end: u64::from(max.0) + 1,
        })
    }

    pub fn start(self) -> u64 {
        self.start
    }

    pub fn end(self) -> u64 {
        self.end
    }

    /// Returns whether this block fully covers `other`.
    pub fn covers(self, other: AsBlock) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    fn is_mergeable(self, other: AsBlock) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn merge(self, other: AsBlock) -> AsBlock {
        AsBlock {
            start: cmp::min(self.start, other.start),
            end: cmp::max(self.end, other.end),
        }
    }
}

impl AsBlock {
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, S::Err> {
        if let Some(id) = cons.take_opt_primitive_if(
            Tag::INTEGER, |prim| {
                let bytes = prim.take_all()?;
                match parse_unsigned_u32(bytes.as_ref()) {
                    Some(value) => Ok(AsId(value)),
                    None => Err(decode::Error::Malformed.into())
                }
            }
        )? {
            return Ok(Some(AsBlock::single(id)))
        }
        cons.take_opt_sequence(|cons| {
            let min = AsId::take_from(cons)?;
            let max = AsId::take_from(cons)?;
            AsBlock::range(min, max).map_err(|_| {
                decode::Error::Malformed.into()
            })
        })
    }
}

impl fmt::Display for AsBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.end == self.start + 1 {
            write!(f, "AS{}", self.start)
        }
        else {
            write!(f, "AS{}-AS{}", self.start, self.end - 1)
        }
    }
}


/// Parses the content octets of a DER INTEGER into a `u32`.
///
/// Returns `None` for negative, oversized, or non-minimal values. A single
/// leading zero octet is allowed to keep values with the top bit set
/// positive.
fn parse_unsigned_u32(mut slice: &[u8]) -> Option<u32> {
    let first = *slice.first()?;
    if first & 0x80 != 0 {
        return None
    }
    if first == 0 && slice.len() > 1 {
        if slice[1] & 0x80 == 0 {
            return None
        }
        slice = &slice[1..];
    }
    if slice.len() > 4 {
        return None
    }
    let mut res = 0u32;
    for &byte in slice {
        res = res << 8 | u32::from(byte);
    }
    Some(res)
}


//------------ AsBlocks ------------------------------------------------------

/// A set of AS numbers in canonical form.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AsBlocks(Vec<AsBlock>);

impl AsBlocks {
    pub fn empty() -> Self {
        AsBlocks(Vec::new())
    }

    pub fn from_blocks<I: IntoIterator<Item = AsBlock>>(iter: I) -> Self {
        let mut blocks: Vec<_> = iter.into_iter().collect();
        blocks.sort_by_key(|block| block.start);
        let mut res = Vec::with_capacity(blocks.len());
        for block in blocks {
            match res.last_mut() {
                Some(last) if block.is_mergeable(*last) => {
                    *last = last.merge(block)
                }
                _ => res.push(block)
            }
        }
        AsBlocks(res)
    }

    pub fn push(&mut self, block: AsBlock) {
        let idx = self.0.partition_point(|item| item.end < block.start);
        let mut merged = block;
        let mut end = idx;
        while end < self.0.len() && merged.is_mergeable(self.0[end]) {
            merged = merged.merge(self.0[end]);
            end += 1;
        }
        self.0.splice(idx..end, Some(merged));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AsBlock> + '_ {
        self.0.iter().cloned()
    }

    /// Returns whether this set covers all of `other`.
    pub fn contains(&self, other: &AsBlocks) -> bool {
        let mut siter = self.0.iter();
        let mut sas = match siter.next() {
            Some(sas) => sas,
            None => return other.0.is_empty()
        };
        for oas in &other.0 {
            loop {
                if oas.start < sas.start {
                    return false
                }
                else if oas.start >= sas.end {
                    sas = match siter.next() {
                        Some(sas) => sas,
                        None => return false
                    };
                }
                else if oas.end > sas.end {
                    return false
                }
                else {
                    break
                }
            }
        }
        true
    }

    /// Returns whether the set contains the single AS number.
    pub fn contains_id(&self, id: AsId) -> bool {
        let id = u64::from(id.0);
        let idx = self.0.partition_point(|item| item.end <= id);
        match self.0.get(idx) {
            Some(block) => block.start <= id,
            None => false
        }
    }

    pub fn union(&self, other: &AsBlocks) -> AsBlocks {
        AsBlocks::from_blocks(self.iter().chain(other.iter()))
    }

    pub fn intersection(&self, other: &AsBlocks) -> AsBlocks {
        let mut res = Vec::new();
        let mut siter = self.0.iter().peekable();
        let mut oiter = other.0.iter().peekable();
        while let (Some(&&s), Some(&&o)) = (siter.peek(), oiter.peek()) {
            let start = cmp::max(s.start, o.start);
            let end = cmp::min(s.end, o.end);
            if start < end {
                res.push(AsBlock { start, end });
            }
            if s.end <= o.end {
                siter.next();
            }
            else {
                oiter.next();
            }
        }
        AsBlocks(res)
    }

    pub fn difference(&self, other: &AsBlocks) -> AsBlocks {
        let mut res = Vec::new();
        let mut oiter = other.0.iter().peekable();
        for &s in &self.0 {
            let mut start = s.start;
            loop {
                while let Some(&&o) = oiter.peek() {
                    if o.end <= start {
                        oiter.next();
                    }
                    else {
                        break
                    }
                }
                match oiter.peek() {
                    Some(&&o) if o.start < s.end => {
                        if o.start > start {
                            res.push(AsBlock { start, end: o.start });
                        }
                        if o.end >= s.end {
                            break
                        }
                        start = o.end;
                    }
                    _ => {
                        res.push(AsBlock { start, end: s.end });
                        break
                    }
                }
            }
        }
        AsBlocks(res)
    }
}


//------------ AsResources ---------------------------------------------------

/// The AS resources extension of a certificate.
#[derive(Clone, Debug)]
pub enum AsResources {
    Inherit,
    Blocks(AsBlocks),
}

impl AsResources {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            cons.take_constructed_if(Tag::CTX_0, |cons| {
                cons.take_value(|tag, content| {
                    if tag == Tag::NULL {
                        content.to_null()?;
                        Ok(AsResources::Inherit)
                    }
                    else if tag == Tag::SEQUENCE {
                        let cons = content.as_constructed()?;
                        let mut blocks = Vec::new();
                        while let Some(block)
                            = AsBlock::take_opt_from(cons)?
                        {
                            blocks.push(block)
                        }
                        if blocks.is_empty() {
                            return Err(decode::Error::Malformed.into())
                        }
                        Ok(AsResources::Blocks(
                            AsBlocks::from_blocks(blocks)
                        ))
                    }
                    else {
                        Err(decode::Error::Malformed.into())
                    }
                })
            })
        })
    }

    pub fn is_inherited(&self) -> bool {
        matches!(*self, AsResources::Inherit)
    }
}


//------------ ResourceSet ---------------------------------------------------

/// The combined, resolved resources of a certificate.
///
/// All three components are literal sets. Values of this type only exist
/// after inherit resolution against the issuer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceSet {
    v4: IpBlocks,
    v6: IpBlocks,
    asn: AsBlocks,
}

impl ResourceSet {
    pub fn new(v4: IpBlocks, v6: IpBlocks, asn: AsBlocks) -> Self {
        ResourceSet { v4, v6, asn }
    }

    pub fn empty() -> Self {
        Default::default()
    }

    pub fn v4(&self) -> &IpBlocks {
        &self.v4
    }

    pub fn v6(&self) -> &IpBlocks {
        &self.v6
    }

    pub fn asn(&self) -> &AsBlocks {
        &self.asn
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty() && self.asn.is_empty()
    }

    pub fn contains(&self, other: &ResourceSet) -> bool {
        self.v4.contains(&other.v4)
            && self.v6.contains(&other.v6)
            && self.asn.contains(&other.asn)
    }

    pub fn union(&self, other: &ResourceSet) -> ResourceSet {
        ResourceSet {
            v4: self.v4.union(&other.v4),
            v6: self.v6.union(&other.v6),
            asn: self.asn.union(&other.asn),
        }
    }

    pub fn intersection(&self, other: &ResourceSet) -> ResourceSet {
        ResourceSet {
            v4: self.v4.intersection(&other.v4),
            v6: self.v6.intersection(&other.v6),
            asn: self.asn.intersection(&other.asn),
        }
    }

    pub fn difference(&self, other: &ResourceSet) -> ResourceSet {
        ResourceSet {
            v4: self.v4.difference(&other.v4),
            v6: self.v6.difference(&other.v6),
            asn: self.asn.difference(&other.asn),
        }
    }

    /// Builds the resource set of a trust anchor.
    ///
    /// A trust anchor has nothing to inherit from, so all families must
    /// be literal and at least one of them non-empty.
    pub fn from_ta(
        ip: Option<&IpResources>,
        asn: Option<&AsResources>,
    ) -> Result<Self, ValidationError> {
        let (v4, v6) = match ip {
            Some(ip) => (
                Self::ta_family(ip.v4())?,
                Self::ta_family(ip.v6())?,
            ),
            None => (IpBlocks::empty(), IpBlocks::empty())
        };
        let asn = match asn {
            Some(AsResources::Blocks(blocks)) => blocks.clone(),
            Some(AsResources::Inherit) => {
                return Err(ValidationError::ResourceViolation)
            }
            None => AsBlocks::empty()
        };
        let res = ResourceSet { v4, v6, asn };
        if res.is_empty() {
            return Err(ValidationError::ResourceViolation)
        }
        Ok(res)
    }

    fn ta_family(
        choice: Option<&IpChoice>
    ) -> Result<IpBlocks, ValidationError> {
        match choice {
            Some(IpChoice::Blocks(blocks)) => Ok(blocks.clone()),
            Some(IpChoice::Inherit) => {
                Err(ValidationError::ResourceViolation)
            }
            None => Ok(IpBlocks::empty())
        }
    }

    /// Resolves a child certificate's resources against this set.
    ///
    /// Inherited families copy the issuer's blocks; literal families must
    /// be covered by the issuer's blocks. This is a one-shot resolution,
    /// the result carries no reference back to the issuer.
    pub fn validate_child(
        &self,
        ip: Option<&IpResources>,
        asn: Option<&AsResources>,
    ) -> Result<Self, ValidationError> {
        let (v4, v6) = match ip {
            Some(ip) => (
                Self::child_family(&self.v4, ip.v4())?,
                Self::child_family(&self.v6, ip.v6())?,
            ),
            None => (IpBlocks::empty(), IpBlocks::empty())
        };
        let asn = match asn {
            Some(AsResources::Inherit) => self.asn.clone(),
            Some(AsResources::Blocks(blocks)) => {
                if !self.asn.contains(blocks) {
                    return Err(ValidationError::ResourceViolation)
                }
                blocks.clone()
            }
            None => AsBlocks::empty()
        };
        Ok(ResourceSet { v4, v6, asn })
    }

    fn child_family(
        parent: &IpBlocks,
        choice: Option<&IpChoice>,
    ) -> Result<IpBlocks, ValidationError> {
        match choice {
            Some(IpChoice::Inherit) => Ok(parent.clone()),
            Some(IpChoice::Blocks(blocks)) => {
                if !parent.contains(blocks) {
                    return Err(ValidationError::ResourceViolation)
                }
                Ok(blocks.clone())
            }
            None => Ok(IpBlocks::empty())
        }
    }
}


//------------ AddressPrefix -------------------------------------------------

/// An IP address prefix: an IP address and a prefix length.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct AddressPrefix {
    addr: IpAddr,
    len: u8,
}

impl AddressPrefix {
    /// Creates a prefix from an address and a length.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, FromStrError> {
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if len > max {
            return Err(FromStrError)
        }
        Ok(AddressPrefix { addr, len })
    }

    pub fn address(self) -> IpAddr {
        self.addr
    }

    pub fn address_length(self) -> u8 {
        self.len
    }

    pub fn is_v4(self) -> bool {
        self.addr.is_ipv4()
    }

    /// Returns the range of the prefix in the 128 bit address space used
    /// by [`IpBlocks`]. IPv4 addresses occupy the upper 32 bits.
    pub fn range(self) -> (u128, u128) {
        let (value, len) = match self.addr {
            IpAddr::V4(addr) => {
                (u128::from(u32::from(addr)) << 96, self.len)
            }
            IpAddr::V6(addr) => (u128::from(addr), self.len),
        };
        if len == 0 {
            (0, !0)
        }
        else {
            let mask = !0u128 >> len;
            (value & !mask, value | mask)
        }
    }

    /// Returns whether `self` covers `other`.
    pub fn covers(self, other: AddressPrefix) -> bool {
        if self.addr.is_ipv4() != other.addr.is_ipv4() {
            return false
        }
        let (smin, smax) = self.range();
        let (omin, omax) = other.range();
        smin <= omin && smax >= omax
    }

    /// Creates a prefix from a range if the range is one.
    pub fn from_range_v4(min: u128, max: u128) -> Option<Self> {
        Self::from_range(min, max, true)
    }

    fn from_range(min: u128, max: u128, v4: bool) -> Option<Self> {
        let diff = min ^ max;
        if min & diff != 0 || max & diff != diff {
            return None
        }
        let len = diff.leading_zeros() as u8;
        if v4 {
            if len > 32 {
                return None
            }
            Some(AddressPrefix {
                addr: IpAddr::V4(Ipv4Addr::from((min >> 96) as u32)),
                len,
            })
        }
        else {
            Some(AddressPrefix {
                addr: IpAddr::V6(Ipv6Addr::from(min)),
                len,
            })
        }
    }
}

impl FromStr for AddressPrefix {
    type Err = FromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.splitn(2, '/');
        let addr = iter.next().ok_or(FromStrError)?;
        let len = iter.next().ok_or(FromStrError)?;
        let addr = IpAddr::from_str(addr).map_err(|_| FromStrError)?;
        let len = u8::from_str(len).map_err(|_| FromStrError)?;
        Self::new(addr, len)
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}


//------------ FromStrError --------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FromStrError;

impl fmt::Display for FromStrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid address prefix")
    }
}

impl std::error::Error for FromStrError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn range(min: u128, max: u128) -> AddressRange {
        AddressRange::new(min, max)
    }

    fn blocks(items: &[(u128, u128)]) -> IpBlocks {
        IpBlocks::from_ranges(
            items.iter().map(|&(min, max)| range(min, max))
        )
    }

    fn asblocks(items: &[(u32, u32)]) -> AsBlocks {
        AsBlocks::from_blocks(items.iter().map(|&(min, max)| {
            AsBlock::range(min.into(), max.into()).unwrap()
        }))
    }

    fn prefix(s: &str) -> AddressPrefix {
        AddressPrefix::from_str(s).unwrap()
    }

    #[test]
    fn canonical_form() {
        // Overlapping and adjacent ranges merge on bulk construction.
        assert_eq!(
            blocks(&[(10, 20), (15, 30), (31, 40), (50, 60)]),
            blocks(&[(10, 40), (50, 60)])
        );

        // Insertion merges too.
        let mut set = blocks(&[(10, 20), (30, 40)]);
        set.push(range(21, 29));
        assert_eq!(set, blocks(&[(10, 40)]));

        let mut set = blocks(&[(10, 20), (30, 40)]);
        set.push(range(50, 60));
        assert_eq!(set, blocks(&[(10, 20), (30, 40), (50, 60)]));

        let mut set = blocks(&[(10, 20), (30, 40), (60, 70)]);
        set.push(range(15, 65));
        assert_eq!(set, blocks(&[(10, 70)]));
    }

    #[test]
    fn containment() {
        let outer = blocks(&[(0, 100), (200, 300)]);
        assert!(outer.contains(&blocks(&[(0, 100)])));
        assert!(outer.contains(&blocks(&[(10, 20), (250, 260)])));
        assert!(outer.contains(&blocks(&[])));
        assert!(!outer.contains(&blocks(&[(90, 110)])));
        assert!(!outer.contains(&blocks(&[(150, 160)])));
        assert!(!blocks(&[]).contains(&blocks(&[(1, 2)])));

        assert!(outer.contains_range(250, 260));
        assert!(!outer.contains_range(99, 101));
    }

    #[test]
    fn set_algebra_properties() {
        let a = blocks(&[(0, 100), (200, 300), (1000, 2000)]);
        let b = blocks(&[(10, 20), (250, 300), (1500, 1600)]);

        // a.contains(b) implies union(a, b) == a and b \ a is empty.
        assert!(a.contains(&b));
        assert_eq!(a.union(&b), a);
        assert!(b.difference(&a).is_empty());

        // Difference and intersection partition the left operand.
        let c = blocks(&[(50, 250), (1999, 3000)]);
        let inter = a.intersection(&c);
        let diff = a.difference(&c);
        assert_eq!(inter.union(&diff), a);
        assert!(inter.intersection(&diff).is_empty());
        assert_eq!(
            inter,
            blocks(&[(50, 100), (200, 250), (1999, 2000)])
        );
        assert_eq!(
            diff,
            blocks(&[(0, 49), (251, 300), (1000, 1998)])
        );
    }

    #[test]
    fn as_blocks() {
        let outer = asblocks(&[(64496, 64511), (65000, 65000)]);
        assert!(outer.contains(&asblocks(&[(64500, 64501)])));
        assert!(outer.contains_id(65000.into()));
        assert!(!outer.contains_id(64512.into()));
        assert!(!outer.contains(&asblocks(&[(64510, 64512)])));

        // A width-one block is a single AS.
        let single = AsBlock::single(64500.into());
        assert_eq!(single.start(), 64500);
        assert_eq!(single.end(), 64501);

        // Adjacent blocks merge.
        assert_eq!(
            asblocks(&[(1, 5), (6, 10)]),
            asblocks(&[(1, 10)])
        );

        let diff = outer.difference(&asblocks(&[(64500, 64505)]));
        assert_eq!(
            diff,
            asblocks(&[(64496, 64499), (64506, 64511), (65000, 65000)])
        );
    }

    #[test]
    fn resource_set_resolution() {
        let parent = ResourceSet::new(
            IpBlocks::from_ranges(Some({
                let (min, max) = prefix("10.0.0.0/8").range();
                range(min, max)
            })),
            IpBlocks::empty(),
            asblocks(&[(64500, 64510)]),
        );

        // A literal subset resolves to itself.
        let child_v4 = IpBlocks::from_ranges(Some({
            let (min, max) = prefix("10.1.0.0/16").range();
            range(min, max)
        }));
        let child = parent.validate_child(
            Some(&IpResources {
                v4: Some(IpChoice::Blocks(child_v4.clone())),
                v6: None,
            }),
            Some(&AsResources::Inherit),
        ).unwrap();
        assert_eq!(child.v4(), &child_v4);
        assert_eq!(child.asn(), parent.asn());

        // An overclaim is a resource violation.
        let over = IpBlocks::from_ranges(Some({
            let (min, max) = prefix("11.0.0.0/8").range();
            range(min, max)
        }));
        assert_eq!(
            parent.validate_child(
                Some(&IpResources {
                    v4: Some(IpChoice::Blocks(over)),
                    v6: None,
                }),
                None,
            ),
            Err(ValidationError::ResourceViolation)
        );

        // A trust anchor must not inherit and must not be empty.
        assert_eq!(
            ResourceSet::from_ta(
                Some(&IpResources {
                    v4: Some(IpChoice::Inherit),
                    v6: None
                }),
                None,
            ),
            Err(ValidationError::ResourceViolation)
        );
        assert_eq!(
            ResourceSet::from_ta(None, None),
            Err(ValidationError::ResourceViolation)
        );
    }

    #[test]
    fn prefixes() {
        let p = prefix("10.0.0.0/8");
        assert!(p.covers(prefix("10.0.0.0/24")));
        assert!(!p.covers(prefix("11.0.0.0/24")));
        assert!(!p.covers(prefix("2001:db8::/32")));
        assert!(prefix("0.0.0.0/0").covers(prefix("192.0.2.0/24")));

        let (min, max) = prefix("192.0.2.0/24").range();
        assert_eq!(
            AddressPrefix::from_range_v4(min, max),
            Some(prefix("192.0.2.0/24"))
        );
        assert_eq!(AddressPrefix::from_range_v4(min, max - 1), None);

        assert!(AddressPrefix::from_str("10.0.0.0/33").is_err());
        assert!(AddressPrefix::from_str("10.0.0.0").is_err());
    }
}
