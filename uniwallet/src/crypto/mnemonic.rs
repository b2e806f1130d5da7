//! Mnemonic phrase generation and handling

use std::fmt;

use bip39::{Language, Mnemonic};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Supported mnemonic strengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MnemonicStrength {
    /// 12 words (128 bits)
    #[default]
    Words12,
    /// 15 words (160 bits)
    Words15,
    /// 18 words (192 bits)
    Words18,
    /// 21 words (224 bits)
    Words21,
    /// 24 words (256 bits)
    Words24,
}

impl MnemonicStrength {
    /// Get entropy length in bytes
    pub fn entropy_bytes(&self) -> usize {
        match self {
            Self::Words12 => 16,
            Self::Words15 => 20,
            Self::Words18 => 24,
            Self::Words21 => 28,
            Self::Words24 => 32,
        }
    }

    /// Number of words in a phrase of this strength
    pub fn word_count(&self) -> usize {
        self.entropy_bytes() * 3 / 4
    }
}

/// Wallet seed: the raw entropy and its checksummed English word sequence.
///
/// The phrase is always a function of the entropy, so holding both is only a
/// convenience. Both buffers are wiped when the seed is dropped.
#[derive(Clone)]
pub struct Seed {
    entropy: Zeroizing<Vec<u8>>,
    phrase: Zeroizing<String>,
}

impl Seed {
    /// Draw a fresh 128-bit seed from the operating system CSPRNG
    pub fn generate() -> Result<Self> {
        Self::generate_with_strength(MnemonicStrength::Words12)
    }

    /// Draw a fresh seed of the given strength from the operating system CSPRNG
    pub fn generate_with_strength(strength: MnemonicStrength) -> Result<Self> {
        let mut entropy = Zeroizing::new(vec![0u8; strength.entropy_bytes()]);
        OsRng.fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| Error::InvalidSeedPhrase(e.to_string()))?;

        Ok(Self {
            phrase: Zeroizing::new(mnemonic.to_string()),
            entropy,
        })
    }

    /// Build a seed from raw entropy (16 to 32 bytes, in steps of 4)
    pub fn from_entropy(entropy: &[u8]) -> Result<Self> {
        let mnemonic = Mnemonic::from_entropy(entropy)
            .map_err(|e| Error::InvalidSeedPhrase(e.to_string()))?;

        Ok(Self {
            entropy: Zeroizing::new(entropy.to_vec()),
            phrase: Zeroizing::new(mnemonic.to_string()),
        })
    }

    /// Parse and checksum-verify a phrase
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = parse(phrase)?;

        Ok(Self {
            entropy: Zeroizing::new(mnemonic.to_entropy()),
            phrase: Zeroizing::new(mnemonic.to_string()),
        })
    }

    /// The space-separated word sequence
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// The underlying entropy
    pub fn entropy(&self) -> &[u8] {
        &self.entropy
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }

    /// Stretch the phrase into the 64-byte BIP-39 seed used for HD derivation
    pub fn to_seed_bytes(&self, passphrase: Option<&str>) -> Result<Zeroizing<[u8; 64]>> {
        let mnemonic = parse(&self.phrase)?;
        Ok(Zeroizing::new(mnemonic.to_seed(passphrase.unwrap_or(""))))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("words", &self.word_count())
            .finish_non_exhaustive()
    }
}

fn parse(phrase: &str) -> Result<Mnemonic> {
    Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| Error::InvalidSeedPhrase(e.to_string()))
}

/// Generate a new random 12-word seed
pub fn generate() -> Result<Seed> {
    Seed::generate()
}

/// Validate a mnemonic phrase. Never fails; malformed input is simply `false`.
pub fn validate(phrase: &str) -> bool {
    parse(phrase).is_ok()
}

/// Recover the entropy encoded by a phrase
pub fn to_entropy(phrase: &str) -> Result<Vec<u8>> {
    Ok(parse(phrase)?.to_entropy())
}

/// Encode entropy as a checksummed phrase
pub fn from_entropy(entropy: &[u8]) -> Result<String> {
    Ok(Seed::from_entropy(entropy)?.phrase().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_mnemonic() {
        let seed = generate().unwrap();
        assert!(validate(seed.phrase()));
        assert_eq!(seed.word_count(), 12);
        assert_eq!(seed.entropy().len(), 16);
    }

    #[test]
    fn test_generate_is_random() {
        assert_ne!(generate().unwrap().phrase(), generate().unwrap().phrase());
    }

    #[test]
    fn test_round_trip_all_strengths() {
        for strength in [
            MnemonicStrength::Words12,
            MnemonicStrength::Words15,
            MnemonicStrength::Words18,
            MnemonicStrength::Words21,
            MnemonicStrength::Words24,
        ] {
            let seed = Seed::generate_with_strength(strength).unwrap();
            assert_eq!(seed.word_count(), strength.word_count());

            let entropy = to_entropy(seed.phrase()).unwrap();
            assert_eq!(entropy, seed.entropy());
            assert_eq!(from_entropy(&entropy).unwrap(), seed.phrase());
        }
    }

    #[test]
    fn test_zero_entropy_vector() {
        let phrase = from_entropy(&[0u8; 16]).unwrap();
        assert_eq!(phrase, ZERO_PHRASE);
        assert!(validate(&phrase));
    }

    #[test]
    fn test_validate_mnemonic() {
        let bad_checksum = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        let not_in_wordlist = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon zzzz";

        assert!(validate(ZERO_PHRASE));
        assert!(!validate(bad_checksum));
        assert!(!validate(not_in_wordlist));
        assert!(!validate(""));
        assert!(!validate("invalid mnemonic phrase test test test test test test test test test"));
    }

    #[test]
    fn test_invalid_inputs_are_seed_errors() {
        assert!(matches!(to_entropy("not a phrase"), Err(Error::InvalidSeedPhrase(_))));
        assert!(matches!(from_entropy(&[0u8; 15]), Err(Error::InvalidSeedPhrase(_))));
        assert!(matches!(Seed::from_phrase("abandon"), Err(Error::InvalidSeedPhrase(_))));
    }

    #[test]
    fn test_mnemonic_to_seed() {
        let seed = Seed::from_phrase(ZERO_PHRASE).unwrap();
        let bytes = seed.to_seed_bytes(None).unwrap();

        // BIP-39 reference vector for the all-zero phrase with an empty passphrase
        assert_eq!(
            hex::encode(&bytes[..]),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
        assert_ne!(*bytes, *seed.to_seed_bytes(Some("TREZOR")).unwrap());
    }

    #[test]
    fn test_debug_hides_words() {
        let seed = Seed::from_phrase(ZERO_PHRASE).unwrap();
        let rendered = format!("{:?}", seed);
        assert!(!rendered.contains("abandon"));
    }
}
