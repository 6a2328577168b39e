use arbor_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Blobs, trees and commits each derive their key from a distinct context
/// string, so identical encoded bytes of two kinds never share an id.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    pub const BLOB: Self = Self::new("arbor-blob-v1");
    pub const TREE: Self = Self::new("arbor-tree-v1");
    pub const COMMIT: Self = Self::new("arbor-commit-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with the domain as the BLAKE3 key-derivation context.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let digest = blake3::Hasher::new_derive_key(self.domain)
            .update(data)
            .finalize();
        ObjectId::from_hash(*digest.as_bytes())
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
