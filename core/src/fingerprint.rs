//! The stable deduplication key (§4.1): FNV-1a 32-bit over `alertname`,
//! coerced severity, and the sorted labels map.

use std::collections::HashMap;

use crate::alert::Severity;

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Compute the fingerprint: `alertname ++ coerced_severity ++ sorted(k+v)`,
/// hex-encoded. Stable under label-map reordering because the `k+v`
/// concatenations are sorted before hashing.
pub fn fingerprint(alertname: &str, coerced_severity: &Severity, labels: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}{v}")).collect();
    pairs.sort();

    let mut buf = String::with_capacity(alertname.len() + 2 + pairs.iter().map(String::len).sum::<usize>());
    buf.push_str(alertname);
    buf.push_str(coerced_severity.as_label());
    for pair in &pairs {
        buf.push_str(pair);
    }

    format!("{:08x}", fnv1a32(buf.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn stable_under_label_reordering() {
        let a = fingerprint("A", &Severity::P1, &labels(&[("a", "a"), ("b", "b"), ("c", "c")]));
        let b = fingerprint("A", &Severity::P1, &labels(&[("c", "c"), ("a", "a"), ("b", "b")]));
        assert_eq!(a, b);
    }

    #[test]
    fn differs_on_severity() {
        let a = fingerprint("A", &Severity::P0, &labels(&[("x", "1")]));
        let b = fingerprint("A", &Severity::P1, &labels(&[("x", "1")]));
        assert_ne!(a, b);
    }

    #[test]
    fn is_hex_encoded_32_bit() {
        let fp = fingerprint("A", &Severity::P1, &HashMap::new());
        assert_eq!(fp.len(), 8);
        assert!(u32::from_str_radix(&fp, 16).is_ok());
    }
}
