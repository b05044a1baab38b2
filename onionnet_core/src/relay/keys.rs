/*! Persistent relay keys.

A keys file holds the public key followed by the secret key, 32 bytes each.
*/

use std::fs::File;
use std::io::{Error as IoError, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use onionnet_crypto::*;
use thiserror::Error;

/// Error that can happen when loading or saving keys.
#[derive(Debug, Error)]
pub enum KeysError {
    /// Keys file exists but can't be read.
    #[error("Failed to read keys from '{}'", path.display())]
    Read {
        /// Path of the keys file.
        path: PathBuf,
        /// IO error.
        #[source]
        error: IoError,
    },
    /// Keys file can't be written.
    #[error("Failed to save keys to '{}'", path.display())]
    Write {
        /// Path of the keys file.
        path: PathBuf,
        /// IO error.
        #[source]
        error: IoError,
    },
    /// Stored public key was not derived from the stored secret key.
    #[error("The loaded public key does not correspond to the loaded secret key")]
    Mismatch,
}

/// Conventional keys file name of the relay with `relay_id` inside `dir`.
pub fn keys_file_path(dir: &Path, relay_id: &str) -> PathBuf {
    dir.join(format!("relay_{}.keys", relay_id))
}

/// Save keys to a binary file. On unix the file is readable by the owner only.
pub fn save_keys(path: &Path, keys: &KeyPair) -> Result<(), KeysError> {
    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let write_error = |error| KeysError::Write { path: path.to_owned(), error };

    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).map_err(write_error)?;
    file.write_all(keys.pk.as_bytes()).map_err(write_error)?;
    file.write_all(keys.sk.as_bytes()).map_err(write_error)?;
    Ok(())
}

fn read_keys(mut file: File, path: &Path) -> Result<KeyPair, KeysError> {
    let mut buf = [0; KEY_SIZE * 2];
    file.read_exact(&mut buf)
        .map_err(|error| KeysError::Read { path: path.to_owned(), error })?;

    let mut pk_bytes = [0; KEY_SIZE];
    pk_bytes.copy_from_slice(&buf[..KEY_SIZE]);
    let mut sk_bytes = [0; KEY_SIZE];
    sk_bytes.copy_from_slice(&buf[KEY_SIZE..]);

    let keys = KeyPair::from_secret_key(SecretKey::from(sk_bytes));
    if keys.pk != PublicKey::from(pk_bytes) {
        return Err(KeysError::Mismatch)
    }
    Ok(keys)
}

/// Load keys from a binary file.
pub fn load_keys(path: &Path) -> Result<KeyPair, KeysError> {
    let file = File::open(path)
        .map_err(|error| KeysError::Read { path: path.to_owned(), error })?;
    read_keys(file, path)
}

/// Load keys from a binary file or generate and save them if file does not
/// exist.
pub fn load_or_gen_keys(path: &Path) -> Result<KeyPair, KeysError> {
    match File::open(path) {
        Ok(file) => read_keys(file, path),
        Err(ref e) if e.kind() == ErrorKind::NotFound => {
            info!("Generating new relay keys and storing them to '{}'", path.display());
            let keys = generate_asymmetric_keypair();
            save_keys(path, &keys)?;
            Ok(keys)
        },
        Err(error) => Err(KeysError::Read { path: path.to_owned(), error }),
    }
}
