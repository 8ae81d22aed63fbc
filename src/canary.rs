//! Canary token generation and corpus injection
//!
//! Canaries are high-entropy markers that are vanishingly unlikely to occur
//! naturally in a text corpus. Splicing them into training data at a known
//! rate gives a downstream membership probe: a model that reproduces a
//! canary memorized the marked data.

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

/// Default length of the random token suffix.
const DEFAULT_CANARY_LENGTH: usize = 16;

/// Default prefix, chosen to be greppable in model output.
const DEFAULT_CANARY_PREFIX: &str = "CENTINELA_CANARY_";

/// Errors for canary injection
#[derive(Error, Debug)]
pub enum CanaryError {
    #[error("no canaries available for injection")]
    NoCanaries,
}

pub type Result<T> = std::result::Result<T, CanaryError>;

/// Generates high-entropy canary tokens.
#[derive(Debug, Clone)]
pub struct CanaryGenerator {
    length: usize,
    prefix: String,
}

impl Default for CanaryGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CANARY_LENGTH, DEFAULT_CANARY_PREFIX)
    }
}

impl CanaryGenerator {
    /// Create a generator with a custom suffix length and prefix.
    pub fn new(length: usize, prefix: impl Into<String>) -> Self {
        Self {
            length,
            prefix: prefix.into(),
        }
    }

    /// Generate a single canary token.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let random_part: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        format!("{}{}", self.prefix, random_part)
    }

    /// Generate a batch of canary tokens.
    pub fn generate_batch(&self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.generate()).collect()
    }
}

/// How canaries are spliced into a text sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionStrategy {
    /// Insert the token at a uniformly random word boundary.
    #[default]
    RandomInsert,
}

/// Injects canary tokens into a text dataset.
#[derive(Debug, Clone)]
pub struct CanaryInjector {
    canaries: Vec<String>,
    strategy: InjectionStrategy,
}

impl CanaryInjector {
    /// Create an injector over a pool of canary tokens.
    pub fn new(canaries: Vec<String>, strategy: InjectionStrategy) -> Self {
        Self { canaries, strategy }
    }

    /// Inject a canary into a single text sample.
    ///
    /// # Arguments
    /// * `text` - The original text
    /// * `canary` - Specific token to inject; picks one from the pool at
    ///   random when `None`
    ///
    /// # Errors
    /// `NoCanaries` when no token was supplied and the pool is empty.
    pub fn inject(&self, text: &str, canary: Option<&str>) -> Result<String> {
        let mut rng = rand::thread_rng();
        let token = match canary {
            Some(token) => token.to_string(),
            None => self
                .canaries
                .choose(&mut rng)
                .cloned()
                .ok_or(CanaryError::NoCanaries)?,
        };

        match self.strategy {
            InjectionStrategy::RandomInsert => {
                let mut words: Vec<&str> = text.split_whitespace().collect();
                if words.is_empty() {
                    return Ok(format!("{text} {token}"));
                }

                let insert_pos = rng.gen_range(0..=words.len());
                words.insert(insert_pos, &token);
                Ok(words.join(" "))
            }
        }
    }

    /// Inject canaries into a dataset at a given rate.
    ///
    /// Each sample is independently injected with probability
    /// `injection_rate`. Returns the modified dataset and the indices of the
    /// samples that received a canary.
    pub fn inject_dataset(
        &self,
        dataset: &[String],
        injection_rate: f64,
    ) -> Result<(Vec<String>, Vec<usize>)> {
        let mut rng = rand::thread_rng();
        let mut modified = Vec::with_capacity(dataset.len());
        let mut injected_indices = Vec::new();

        for (i, text) in dataset.iter().enumerate() {
            if rng.gen::<f64>() < injection_rate {
                modified.push(self.inject(text, None)?);
                injected_indices.push(i);
            } else {
                modified.push(text.clone());
            }
        }

        Ok((modified, injected_indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_has_prefix_and_length() {
        let generator = CanaryGenerator::default();
        let token = generator.generate();

        assert!(token.starts_with(DEFAULT_CANARY_PREFIX));
        assert_eq!(token.len(), DEFAULT_CANARY_PREFIX.len() + 16);

        let suffix = &token[DEFAULT_CANARY_PREFIX.len()..];
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_batch_is_unique() {
        let generator = CanaryGenerator::default();
        let batch = generator.generate_batch(50);
        let unique: HashSet<_> = batch.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn test_custom_prefix() {
        let generator = CanaryGenerator::new(8, "MARKER_");
        let token = generator.generate();
        assert!(token.starts_with("MARKER_"));
        assert_eq!(token.len(), "MARKER_".len() + 8);
    }

    #[test]
    fn test_inject_places_token_at_word_boundary() {
        let injector = CanaryInjector::new(
            vec!["TOKEN_A".to_string()],
            InjectionStrategy::RandomInsert,
        );
        let text = "the quick brown fox";

        let injected = injector.inject(text, None).unwrap();
        let words: Vec<&str> = injected.split_whitespace().collect();
        assert_eq!(words.len(), 5);
        assert!(words.contains(&"TOKEN_A"));

        // Original word order survives once the token is removed.
        let rest: Vec<&str> = words.into_iter().filter(|w| *w != "TOKEN_A").collect();
        assert_eq!(rest, vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn test_inject_specific_canary() {
        let injector = CanaryInjector::new(Vec::new(), InjectionStrategy::RandomInsert);
        let injected = injector.inject("some text", Some("FORCED")).unwrap();
        assert!(injected.contains("FORCED"));
    }

    #[test]
    fn test_inject_empty_text() {
        let injector =
            CanaryInjector::new(vec!["T".to_string()], InjectionStrategy::RandomInsert);
        let injected = injector.inject("", None).unwrap();
        assert_eq!(injected, " T");
    }

    #[test]
    fn test_inject_without_canaries_fails() {
        let injector = CanaryInjector::new(Vec::new(), InjectionStrategy::RandomInsert);
        let result = injector.inject("some text", None);
        assert!(matches!(result, Err(CanaryError::NoCanaries)));
    }

    #[test]
    fn test_inject_dataset_full_rate() {
        let injector = CanaryInjector::new(
            vec!["TOKEN_A".to_string(), "TOKEN_B".to_string()],
            InjectionStrategy::RandomInsert,
        );
        let dataset: Vec<String> = (0..20).map(|i| format!("sample number {i}")).collect();

        let (modified, indices) = injector.inject_dataset(&dataset, 1.0).unwrap();
        assert_eq!(modified.len(), 20);
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        for text in &modified {
            assert!(text.contains("TOKEN_"));
        }
    }

    #[test]
    fn test_inject_dataset_zero_rate() {
        let injector =
            CanaryInjector::new(vec!["T".to_string()], InjectionStrategy::RandomInsert);
        let dataset: Vec<String> = (0..20).map(|i| format!("sample number {i}")).collect();

        let (modified, indices) = injector.inject_dataset(&dataset, 0.0).unwrap();
        assert!(indices.is_empty());
        assert_eq!(modified, dataset);
    }
}
