//! Compile-time name resolution, consumed behind a trait
//!
//! The compiler never owns name resolution; the embedding environment
//! supplies it. Handles returned here live in the resolver's own integer
//! space and are encoded directly as instruction operands.

use crate::template::CompilableTemplate;
use std::rc::Rc;
use trellis_wire::TemplateReferrer;

/// What optional behaviors a component definition requires; consulted to
/// pick the static vs. dynamic invocation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const DYNAMIC_LAYOUT: Capabilities = Capabilities(1 << 0);
    pub const DYNAMIC_TAG: Capabilities = Capabilities(1 << 1);
    pub const PREPARE_ARGS: Capabilities = Capabilities(1 << 2);
    pub const CREATE_ARGS: Capabilities = Capabilities(1 << 3);
    pub const ATTRIBUTE_HOOK: Capabilities = Capabilities(1 << 4);
    pub const ELEMENT_HOOK: Capabilities = Capabilities(1 << 5);
    pub const DYNAMIC_SCOPE: Capabilities = Capabilities(1 << 6);
    pub const CREATE_CALLER: Capabilities = Capabilities(1 << 7);
    pub const UPDATE_HOOK: Capabilities = Capabilities(1 << 8);

    pub fn empty() -> Capabilities {
        Capabilities(0)
    }

    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    pub fn has(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

pub trait Resolver {
    /// Resolves a component tag name to a definition handle, or None when
    /// no such component exists.
    fn lookup_component(&self, tag: &str, referrer: &TemplateReferrer) -> Option<u32>;

    fn capabilities_of(&self, handle: u32) -> Capabilities;

    /// The component's compilable layout, or None when the layout must be
    /// resolved dynamically at runtime.
    fn layout_of(&self, handle: u32) -> Option<Rc<CompilableTemplate>>;

    fn resolve_helper(&self, name: &str, referrer: &TemplateReferrer) -> Option<u32>;

    fn resolve_modifier(&self, name: &str, referrer: &TemplateReferrer) -> Option<u32>;
}

/// Resolves nothing. Useful for templates with no component, helper, or
/// modifier references, and as a test double.
#[derive(Debug, Default)]
pub struct NoopResolver;

impl Resolver for NoopResolver {
    fn lookup_component(&self, _tag: &str, _referrer: &TemplateReferrer) -> Option<u32> {
        None
    }

    fn capabilities_of(&self, _handle: u32) -> Capabilities {
        Capabilities::empty()
    }

    fn layout_of(&self, _handle: u32) -> Option<Rc<CompilableTemplate>> {
        None
    }

    fn resolve_helper(&self, _name: &str, _referrer: &TemplateReferrer) -> Option<u32> {
        None
    }

    fn resolve_modifier(&self, _name: &str, _referrer: &TemplateReferrer) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_bits() {
        let caps = Capabilities::PREPARE_ARGS.union(Capabilities::DYNAMIC_LAYOUT);
        assert!(caps.has(Capabilities::PREPARE_ARGS));
        assert!(caps.has(Capabilities::DYNAMIC_LAYOUT));
        assert!(!caps.has(Capabilities::DYNAMIC_TAG));
    }

    #[test]
    fn test_noop_resolver() {
        let resolver = NoopResolver;
        let referrer = TemplateReferrer::anonymous();
        assert!(resolver.lookup_component("x-widget", &referrer).is_none());
        assert!(resolver.resolve_helper("format", &referrer).is_none());
    }
}
