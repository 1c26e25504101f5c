use rand::{thread_rng, Rng};

const MAX_NAME_LENGTH: usize = 63;
const RANDOM_LENGTH: usize = 5;
const MAX_GENERATED_NAME_LENGTH: usize = MAX_NAME_LENGTH - RANDOM_LENGTH;

// no vowels and no easily confused characters
const ALPHANUMS: &[char] = &[
    'b', 'c', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'm', 'n', 'p', 'q', 'r', 's', 't', 'v', 'w', 'x',
    'z', '2', '4', '5', '6', '7', '8', '9',
];

pub trait NameGenerator: Send + Sync {
    fn generate_name(&self, base: &str) -> String;
}

/// Appends 5 random lowercase alphanumerics to the base, truncating the base
/// so the result stays within 63 characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNameGenerator;

impl NameGenerator for SimpleNameGenerator {
    fn generate_name(&self, base: &str) -> String {
        let base = match base.char_indices().nth(MAX_GENERATED_NAME_LENGTH) {
            Some((cutoff, _)) => &base[..cutoff],
            None => base,
        };

        let mut rng = thread_rng();
        let suffix: String = (0..RANDOM_LENGTH)
            .map(|_| ALPHANUMS[rng.gen_range(0..ALPHANUMS.len())])
            .collect();

        format!("{base}{suffix}")
    }
}
