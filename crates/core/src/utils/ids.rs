use rand::Rng;

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Local record id: creation time plus a random suffix.
///
/// Callers must not derive ordering from these ids.
pub fn generate_record_id(now_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", now_millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_carry_timestamp_prefix_and_random_suffix() {
        let id = generate_record_id(1_700_000_000_000);
        let (prefix, suffix) = id.split_once('-').expect("separator");
        assert_eq!(prefix, "1700000000000");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn ids_generated_in_the_same_millisecond_differ() {
        let ids: HashSet<String> = (0..500).map(|_| generate_record_id(7)).collect();
        assert_eq!(ids.len(), 500);
    }
}
