use std::fmt;

/// Agent side id of a breakpoint. It depends on the address only, so `Z` and
/// `z` packets for one address name the same breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakpointId(String);

impl BreakpointId {
    pub fn from_address(address: u64) -> Self {
        Self(format!("BP_{address:#x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
