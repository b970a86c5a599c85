//! Compiled program bundle and its serialized artifact

use crate::constants::{Constants, ConstantsSnapshot, RuntimeConstants};
use crate::error::ProgramResult;
use crate::heap::{Heap, HeapSnapshot, RuntimeHeap};
use crate::stdlib::StdLib;
use serde::{Deserialize, Serialize};

/// The mutable program under construction: one heap, one constant pool.
pub struct Program {
    pub heap: Heap,
    pub constants: Constants,
}

impl Program {
    pub fn new(constants: Constants) -> Self {
        Program {
            heap: Heap::new(),
            constants,
        }
    }

    /// Finalizes into the persistable artifact. Runs the heap patch passes
    /// if they have not run yet; fails if the constant pool holds opaque
    /// in-memory entries.
    pub fn into_artifact(mut self, stdlib: StdLib) -> ProgramResult<ProgramArtifact> {
        let heap = self.heap.capture(&stdlib, None);
        let constants = self.constants.serialize()?;
        Ok(ProgramArtifact {
            heap,
            constants,
            stdlib,
        })
    }
}

/// Everything needed to reconstruct a compiled program: the heap snapshot,
/// the constant pool tables, and the stdlib entry-point handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramArtifact {
    pub heap: HeapSnapshot,
    pub constants: ConstantsSnapshot,
    pub stdlib: StdLib,
}

impl ProgramArtifact {
    pub fn hydrate(self) -> (RuntimeHeap, RuntimeConstants) {
        (
            RuntimeHeap::hydrate(self.heap),
            RuntimeConstants::hydrate(self.constants),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Handle;

    #[test]
    fn test_artifact_roundtrip() {
        let mut program = Program::new(Constants::new());
        let id = program.constants.string("greeting");
        let handle = program.heap.malloc();
        program.heap.push(7);
        program.heap.finish_malloc(handle, 1);

        let stdlib = StdLib {
            main: Handle(0),
            trusting_guarded_append: Handle(0),
            cautious_guarded_append: Handle(0),
        };
        let artifact = program.into_artifact(stdlib).unwrap();

        let json = serde_json::to_string(&artifact).unwrap();
        let reparsed: ProgramArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, artifact);

        let (heap, constants) = reparsed.hydrate();
        assert_eq!(heap.get(0), 7);
        assert_eq!(constants.get_string(id).unwrap(), "greeting");
    }
}
