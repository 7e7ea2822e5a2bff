use crate::Digest;
use sha2::{Digest as _, Sha256};

/// A SHA-256 hasher whose input is prefixed with a length-prefixed domain
/// separator.
pub(crate) struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub(crate) fn for_domain(domain: &str) -> Self {
        assert!(domain.len() < 256);
        let mut state = Sha256::new();
        state.update([domain.len() as u8]);
        state.update(domain.as_bytes());
        Self { state }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    pub(crate) fn finalize(self) -> Digest {
        Digest(self.state.finalize().into())
    }
}
