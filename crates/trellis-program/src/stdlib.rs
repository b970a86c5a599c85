//! Standard library entry points
//!
//! Three shared bootstrap routines every compiled program links against:
//! the main entry point and the two guarded-append routines (trusting vs.
//! escaping output). Emission sites reference them symbolically through
//! [`StdlibRef`]; the heap's stdlib patch pass resolves the real handles.

use crate::heap::Handle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StdlibRef {
    Main,
    TrustingGuardedAppend,
    CautiousGuardedAppend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdLib {
    pub main: Handle,
    pub trusting_guarded_append: Handle,
    pub cautious_guarded_append: Handle,
}

impl StdLib {
    pub fn get(&self, slot: StdlibRef) -> Handle {
        match slot {
            StdlibRef::Main => self.main,
            StdlibRef::TrustingGuardedAppend => self.trusting_guarded_append,
            StdlibRef::CautiousGuardedAppend => self.cautious_guarded_append,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_lookup() {
        let stdlib = StdLib {
            main: Handle(3),
            trusting_guarded_append: Handle(4),
            cautious_guarded_append: Handle(5),
        };
        assert_eq!(stdlib.get(StdlibRef::Main), Handle(3));
        assert_eq!(stdlib.get(StdlibRef::TrustingGuardedAppend), Handle(4));
        assert_eq!(stdlib.get(StdlibRef::CautiousGuardedAppend), Handle(5));
    }
}
