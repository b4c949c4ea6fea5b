//! Block-cipher capability: a 128-bit key, 128-bit block encrypt.

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};

/// A keyed 128-bit block cipher context.
pub trait BlockCipher {
    /// Install a 128-bit key, replacing any previous one.
    fn set_key(&mut self, key: &[u8; 16]);
    /// Encrypt one 128-bit block in place.
    fn encrypt(&self, block: &mut [u8; 16]);
}

/// Default `BlockCipher` backed by RustCrypto's AES-128.
pub struct Aes128Cipher {
    inner: Option<Aes128>,
}

impl Aes128Cipher {
    pub fn new() -> Self {
        Aes128Cipher { inner: None }
    }
}

impl Default for Aes128Cipher {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCipher for Aes128Cipher {
    fn set_key(&mut self, key: &[u8; 16]) {
        self.inner = Some(Aes128::new(GenericArray::from_slice(key)));
    }

    fn encrypt(&self, block: &mut [u8; 16]) {
        let cipher = self
            .inner
            .as_ref()
            .expect("encrypt called before set_key installed a key");
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_is_deterministic_for_a_fixed_key_and_block() {
        let mut cipher = Aes128Cipher::new();
        cipher.set_key(&[0x2bu8; 16]);
        let mut a = [0x11u8; 16];
        let mut b = [0x11u8; 16];
        cipher.encrypt(&mut a);
        cipher.encrypt(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn encrypt_changes_the_block() {
        let mut cipher = Aes128Cipher::new();
        cipher.set_key(&[0x5Au8; 16]);
        let original = [0x00u8; 16];
        let mut block = original;
        cipher.encrypt(&mut block);
        assert_ne!(block, original);
    }

    #[test]
    #[should_panic]
    fn encrypt_before_key_panics() {
        let cipher = Aes128Cipher::new();
        let mut block = [0u8; 16];
        cipher.encrypt(&mut block);
    }
}
