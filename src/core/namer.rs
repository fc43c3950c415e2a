//! Deterministic external names for declared resources.

use rand::Rng;

/// Per-stack namer: `{stack_id}-{logical_name}-{suffix}`.
///
/// The suffix is drawn once when the stack is registered, so a `Ref` to a
/// resource resolves to exactly the name later used to create it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamer {
    stack_id: String,
    suffix: String,
}

impl ResourceNamer {
    pub fn new(stack_id: &str, suffix: &str) -> Self {
        Self {
            stack_id: stack_id.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// Namer with a fresh random lowercase suffix of `len` letters.
    pub fn generate(stack_id: &str, len: usize) -> Self {
        Self::new(stack_id, &random_suffix(len))
    }

    pub fn name_for(&self, logical_name: &str) -> String {
        format!("{}-{}-{}", self.stack_id, logical_name, self.suffix)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}
