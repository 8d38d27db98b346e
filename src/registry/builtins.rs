//! The Allowed-Functions Registry.
//!
//! The code generator emits calls only to names listed here (plus imports and
//! locally defined functions). Host introspection surfaces such as `eval`,
//! `exec`, `compile`, `__import__` and `getattr` are absent,
//! and the sandbox shim installs exactly this set as the child's builtins.

use super::CallEffect;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub effect: CallEffect,
}

pub static ALLOWED: &[Builtin] = &[
    Builtin {
        name: "print",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "log",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "len",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "str",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "num",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "int",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "range",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "keys",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "values",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "push",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "pop",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "abs",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "min",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "max",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "typeof",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "input",
        effect: CallEffect::Source("external"),
    },
    Builtin {
        name: "has_capability",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "list_capabilities",
        effect: CallEffect::Pure,
    },
    Builtin {
        name: "describe_capability",
        effect: CallEffect::Pure,
    },
];

pub fn names() -> impl Iterator<Item = &'static str> {
    ALLOWED.iter().map(|builtin| builtin.name)
}

pub fn is_allowed(name: &str) -> bool {
    ALLOWED.iter().any(|builtin| builtin.name == name)
}

pub fn effect(name: &str) -> Option<CallEffect> {
    ALLOWED
        .iter()
        .find(|builtin| builtin.name == name)
        .map(|builtin| builtin.effect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_introspection_surfaces_are_absent() {
        for name in ["eval", "exec", "compile", "__import__", "getattr", "open"] {
            assert!(!is_allowed(name), "{name} must not be an allowed builtin");
        }
    }

    #[test]
    fn test_input_is_a_taint_source() {
        assert_eq!(effect("input"), Some(CallEffect::Source("external")));
    }
}
