use serde::{Deserialize, Serialize};

/// Breadth of data a grant reaches.
///
/// Totally ordered: `Own < Department < Branch < Global`. A grant at scope `S`
/// covers every record whose ownership tier (see
/// [`required_scope`](crate::authorize::required_scope)) is `<= S`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataScope {
    Own = 1,
    Department = 2,
    Branch = 3,
    Global = 4,
}

impl DataScope {
    pub const ALL: [DataScope; 4] = [
        DataScope::Own,
        DataScope::Department,
        DataScope::Branch,
        DataScope::Global,
    ];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataScope::Own => "own",
            DataScope::Department => "department",
            DataScope::Branch => "branch",
            DataScope::Global => "global",
        }
    }

    /// `true` if a grant at `self` reaches records of tier `tier`.
    pub fn covers(self, tier: DataScope) -> bool {
        self >= tier
    }
}

impl core::fmt::Display for DataScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
