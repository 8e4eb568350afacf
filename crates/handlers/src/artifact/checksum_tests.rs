// SPDX-License-Identifier: MIT

use super::*;
use std::io::Write;

// Digests of the empty input.
const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

#[yare::parameterized(
    sha256 = { ChecksumAlgorithm::Sha256, EMPTY_SHA256 },
    sha1   = { ChecksumAlgorithm::Sha1,   EMPTY_SHA1 },
    md5    = { ChecksumAlgorithm::Md5,    EMPTY_MD5 },
)]
fn empty_digests(algorithm: ChecksumAlgorithm, expected: &str) {
    assert_eq!(hash_bytes(b"", algorithm), expected);
}

#[test]
fn known_sha256_vector() {
    assert_eq!(
        hash_bytes(b"abc", ChecksumAlgorithm::Sha256),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[tokio::test]
async fn file_hash_matches_buffer_hash() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"warden artifact payload").unwrap();

    let from_file = hash_file(file.path(), ChecksumAlgorithm::Sha256).await.unwrap();
    let from_bytes = hash_bytes(b"warden artifact payload", ChecksumAlgorithm::Sha256);
    assert_eq!(from_file, from_bytes);
}

#[tokio::test]
async fn zero_byte_file_hashes_to_empty_digest() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let digest = hash_file(file.path(), ChecksumAlgorithm::Sha256).await.unwrap();
    assert_eq!(digest, EMPTY_SHA256);
}

#[tokio::test]
async fn large_file_streams_in_chunks() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let payload = vec![0xabu8; 1_000_000];
    file.write_all(&payload).unwrap();

    let from_file = hash_file(file.path(), ChecksumAlgorithm::Sha1).await.unwrap();
    assert_eq!(from_file, hash_bytes(&payload, ChecksumAlgorithm::Sha1));
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let err = hash_file(Path::new("/no/such/file"), ChecksumAlgorithm::Md5).await;
    assert!(err.is_err());
}
