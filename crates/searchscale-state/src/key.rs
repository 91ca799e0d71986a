//! Deterministic document keys.
//!
//! FNV-1a (32-bit) keeps keys short and stable across processes and
//! releases. It is not collision resistant; one cluster per key is assumed.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of `bytes`.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Key of the singleton Operation State document for a cluster.
pub fn document_key(cluster_id: &str) -> String {
    fnv1a_32(cluster_id.as_bytes()).to_string()
}
