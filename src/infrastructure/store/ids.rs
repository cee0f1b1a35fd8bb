use rand::Rng;
use rand::distributions::Alphanumeric;

const AUTO_ID_LEN: usize = 20;

/// Random document id in the same shape Firestore generates client-side.
pub fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_ids_are_alphanumeric_and_distinct() {
        let a = auto_id();
        let b = auto_id();
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
