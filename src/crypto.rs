//! AES-128-CBC field decryption and password bruteforce for SFDL descriptors.
//!
//! Encrypted descriptor fields are base64 strings whose first block is the
//! CBC initialization vector. The key is the MD5 digest of the password.

use aes::Aes128;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest, Md5};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const BLOCK: usize = 16;

/// Returns true for zero-width characters and the byte-order mark.
#[must_use]
pub const fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{FEFF}')
}

/// Removes zero-width characters and the byte-order mark, then trims.
#[must_use]
pub fn strip_invisible(text: &str) -> String {
    text.chars()
        .filter(|c| !is_zero_width(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn derive_key(password: &str) -> [u8; BLOCK] {
    let digest = Md5::digest(password.as_bytes());
    let mut key = [0u8; BLOCK];
    key.copy_from_slice(&digest);
    key
}

/// Decrypts one base64 field with `password`.
///
/// The IV block is dropped from the output, PKCS#7 padding is removed when
/// the final byte is a plausible pad length, and the result is reduced to
/// printable text. Returns `None` on malformed input; never panics.
#[must_use]
pub fn decrypt(password: &str, ciphertext: &str) -> Option<String> {
    let compact: String = ciphertext.chars().filter(|c| !c.is_whitespace()).collect();
    let mut data = BASE64.decode(compact).ok()?;
    if data.len() < 2 * BLOCK || data.len() % BLOCK != 0 {
        return None;
    }

    let iv: [u8; BLOCK] = data[..BLOCK].try_into().ok()?;
    let key = derive_key(password);
    let plain = Aes128CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut data)
        .ok()?;

    let mut body = plain[BLOCK..].to_vec();
    if let Some(&pad) = body.last() {
        let pad = usize::from(pad);
        if pad < BLOCK {
            body.truncate(body.len() - pad);
        }
    }

    Some(sanitize(&body))
}

fn sanitize(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let printable: String = text
        .chars()
        .filter(|c| *c != '\0' && *c != char::REPLACEMENT_CHARACTER)
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();
    strip_invisible(&printable)
}

/// Encrypts `plaintext` into the base64 layout [`decrypt`] reads.
#[must_use]
pub fn encrypt(password: &str, plaintext: &str, iv: [u8; BLOCK]) -> String {
    let key = derive_key(password);
    let ciphertext =
        Aes128CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut out = Vec::with_capacity(BLOCK + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    BASE64.encode(out)
}

/// Heuristic check that a decrypted field looks like a host, path or name.
///
/// Accepts text containing `.`, `/` or `@`, or alphanumeric text (ignoring
/// `_`, `-` and `.`) longer than five characters.
#[must_use]
pub fn is_plausible(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if text.contains(['.', '/', '@']) {
        return true;
    }
    let mut core = text.chars().filter(|c| !matches!(c, '_' | '-' | '.')).peekable();
    core.peek().is_some() && core.all(char::is_alphanumeric) && text.chars().count() > 5
}

/// Finds the first candidate whose decryption of `ciphertext` is plausible.
///
/// Empty candidates are skipped. The password is returned rather than the
/// plaintext so the remaining fields can be decrypted with it.
#[must_use]
pub fn bruteforce<'a, I>(candidates: I, ciphertext: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let found = candidates
        .into_iter()
        .map(String::as_str)
        .filter(|candidate| !candidate.is_empty())
        .find(|candidate| decrypt(candidate, ciphertext).is_some_and(|plain| is_plausible(&plain)));

    match found {
        Some(_) => log::debug!("Found descriptor password"),
        None => log::debug!("No candidate password matched"),
    }
    found
}
