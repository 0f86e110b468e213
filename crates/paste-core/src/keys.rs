//! Lookup-key and delete-secret generation.
//!
//! Both draw every character independently and uniformly from the configured
//! alphabet using the operating system's CSPRNG. Keys have a fixed length;
//! secrets pick their length from a range so they are harder to guess and
//! less memorable than the key they protect.

use rand::rngs::OsRng;
use rand::Rng;

use crate::config::KeyConfig;
use crate::error::{PasteError, Result};
use crate::secret::DeleteSecret;

#[derive(Debug, Clone)]
pub struct KeyGenerator {
    alphabet: Vec<char>,
    key_length: usize,
    secret_min_length: usize,
    secret_max_length: usize,
}

impl KeyGenerator {
    pub fn from_config(config: &KeyConfig) -> Result<Self> {
        let mut alphabet: Vec<char> = Vec::new();
        for c in config.key_chars.chars() {
            if !alphabet.contains(&c) {
                alphabet.push(c);
            }
        }
        if config.with_uppercase {
            let upper: Vec<char> = alphabet
                .iter()
                .flat_map(|c| c.to_uppercase())
                .collect();
            for c in upper {
                if !alphabet.contains(&c) {
                    alphabet.push(c);
                }
            }
        }

        if alphabet.is_empty() {
            return Err(PasteError::Config("Key alphabet cannot be empty".to_string()));
        }
        if config.key_length == 0 {
            return Err(PasteError::Config("Key length must be positive".to_string()));
        }
        if config.secret_min_length == 0 || config.secret_min_length > config.secret_max_length {
            return Err(PasteError::Config(format!(
                "Invalid delete secret length range {}..={}",
                config.secret_min_length, config.secret_max_length
            )));
        }

        Ok(Self {
            alphabet,
            key_length: config.key_length,
            secret_min_length: config.secret_min_length,
            secret_max_length: config.secret_max_length,
        })
    }

    /// The draw set after uppercase expansion.
    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    /// A public lookup key.
    pub fn generate_key(&self) -> String {
        self.generate(self.key_length)
    }

    /// A fresh delete secret of randomized length.
    pub fn generate_secret(&self) -> DeleteSecret {
        let length = OsRng.gen_range(self.secret_min_length..=self.secret_max_length);
        DeleteSecret::new(self.generate(length))
    }

    /// A random string of `length` characters from the alphabet.
    pub fn generate(&self, length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}
