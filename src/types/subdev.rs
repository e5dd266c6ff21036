//! Front-end slot identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// One physical receive front-end: daughterboard slot plus subdevice.
///
/// In a subdev spec the position of a pair is the logical channel index
/// on its board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubDevSpecPair {
    pub db_name: String,
    pub sd_name: String,
}

impl SubDevSpecPair {
    pub fn new(db_name: impl Into<String>, sd_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            sd_name: sd_name.into(),
        }
    }
}

impl fmt::Display for SubDevSpecPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.db_name, self.sd_name)
    }
}

/// Render a spec the way devices print it, e.g. `A:0 A:1`.
pub fn spec_markup(spec: &[SubDevSpecPair]) -> String {
    spec.iter()
        .map(|pair| pair.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_markup() {
        let spec = vec![SubDevSpecPair::new("A", "0"), SubDevSpecPair::new("A", "1")];
        assert_eq!(spec_markup(&spec), "A:0 A:1");
        assert_eq!(spec_markup(&[]), "");
    }
}
