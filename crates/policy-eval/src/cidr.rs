//! Network range helpers and CIDR value sets.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::{EvalError, Result};
use crate::value::{FieldValue, FieldValueType, LiteralValue};

/// Whether two ranges overlap, i.e. one contains the other's network address.
pub fn ipnets_match(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Whether two ranges are the same network with the same prefix length.
pub fn ipnet_equals(a: &IpNet, b: &IpNet) -> bool {
    a.trunc() == b.trunc()
}

/// Parse either `addr/prefix` or a bare address (host prefix).
pub fn parse_ipnet(s: &str) -> Result<IpNet> {
    if s.contains('/') {
        Ok(s.parse::<IpNet>()?)
    } else {
        Ok(IpNet::from(s.parse::<IpAddr>()?))
    }
}

/// A set of network ranges a field is tested against.
#[derive(Debug, Clone, Default)]
pub struct CidrValues {
    ipnets: Vec<IpNet>,
    field_values: Vec<FieldValue>,
}

impl CidrValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ipnets(&self) -> &[IpNet] {
        &self.ipnets
    }

    pub fn field_values(&self) -> &[FieldValue] {
        &self.field_values
    }

    pub fn len(&self) -> usize {
        self.ipnets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipnets.is_empty()
    }

    /// Add a range; duplicates are ignored.
    pub fn append_ipnet(&mut self, net: IpNet) {
        let net = net.trunc();
        if self.ipnets.contains(&net) {
            return;
        }
        self.ipnets.push(net);
        self.field_values.push(FieldValue {
            value: LiteralValue::Cidr(net),
            value_type: FieldValueType::IpNet,
        });
    }

    pub fn append_cidr(&mut self, cidr: &str) -> Result<()> {
        let net: IpNet = cidr.parse()?;
        self.append_ipnet(net);
        Ok(())
    }

    /// Add a single address as a host range (`/32` or `/128`).
    pub fn append_ip(&mut self, ip: &str) -> Result<()> {
        let addr: IpAddr = ip.parse()?;
        self.append_ipnet(IpNet::from(addr));
        Ok(())
    }

    /// Add a literal, either a range or its text form.
    pub fn append_field_value(&mut self, value: &FieldValue) -> Result<()> {
        match &value.value {
            LiteralValue::Cidr(net) => self.append_ipnet(*net),
            LiteralValue::Str(s) => self.append_ipnet(parse_ipnet(s)?),
            other => return Err(EvalError::InvalidFieldValue(other.to_string())),
        }
        Ok(())
    }

    /// Return the first range overlapping `net`.
    pub fn contains(&self, net: &IpNet) -> Option<IpNet> {
        self.ipnets.iter().find(|n| ipnets_match(n, net)).copied()
    }

    /// Weak match: at least one of `nets` is in the set.
    pub fn match_any(&self, nets: &[IpNet]) -> Option<IpNet> {
        nets.iter().find_map(|n| self.contains(n))
    }

    /// Strong match: every one of `nets` is in the set.
    pub fn match_all(&self, nets: &[IpNet]) -> bool {
        nets.iter().all(|n| self.contains(n).is_some())
    }
}

impl FromIterator<IpNet> for CidrValues {
    fn from_iter<I: IntoIterator<Item = IpNet>>(iter: I) -> Self {
        let mut values = CidrValues::new();
        for net in iter {
            values.append_ipnet(net);
        }
        values
    }
}
