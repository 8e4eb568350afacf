// SPDX-License-Identifier: MIT

use super::*;

#[yare::parameterized(
    iso          = { "iso", Some(LocationKind::Iso) },
    image        = { "image", Some(LocationKind::Image) },
    provisioning = { "provisioning", Some(LocationKind::Provisioning) },
    unknown      = { "tarballs", None },
)]
fn location_kind_parse(input: &str, expected: Option<LocationKind>) {
    assert_eq!(LocationKind::parse(input), expected);
}

#[test]
fn location_kind_round_trip() {
    for kind in [LocationKind::Iso, LocationKind::Image, LocationKind::Provisioning] {
        assert_eq!(LocationKind::parse(kind.as_str()), Some(kind));
        assert_eq!(kind.to_string(), kind.as_str());
    }
}

#[test]
fn checksum_algorithm_default_is_sha256() {
    assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Sha256);
}

#[yare::parameterized(
    md5    = { "md5", Some(ChecksumAlgorithm::Md5) },
    sha1   = { "sha1", Some(ChecksumAlgorithm::Sha1) },
    sha256 = { "sha256", Some(ChecksumAlgorithm::Sha256) },
    crc    = { "crc32", None },
)]
fn checksum_algorithm_parse(input: &str, expected: Option<ChecksumAlgorithm>) {
    assert_eq!(ChecksumAlgorithm::parse(input), expected);
}

#[yare::parameterized(
    iso      = { "omnios.iso", Some("iso") },
    tgz      = { "bundle.tgz", Some("tgz") },
    upper    = { "DISK.IMG", Some("img") },
    none     = { "README", None },
    dotfile  = { ".profile", None },
)]
fn file_extension_lowercases(filename: &str, expected: Option<&str>) {
    assert_eq!(file_extension(filename).as_deref(), expected);
}

#[test]
fn mime_type_known_and_fallback() {
    assert_eq!(mime_type_for("iso"), "application/x-iso9660-image");
    assert_eq!(mime_type_for("gz"), "application/gzip");
    assert_eq!(mime_type_for("weird"), "application/octet-stream");
}

#[test]
fn checksum_serde_uses_lowercase() {
    let json = serde_json::to_string(&ChecksumAlgorithm::Sha256).unwrap();
    assert_eq!(json, "\"sha256\"");
}
