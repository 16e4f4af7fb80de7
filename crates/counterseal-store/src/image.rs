//! Snapshot sidecars.
//!
//! When the host writes a snapshot it commits a tag bound to the snapshot's
//! content and to the counter the commit produces, and keeps that binding in
//! a `<snapshot>.seal` file next to it. On load the snapshot is re-hashed and
//! checked against the sidecar before anything is trusted.

use std::path::{Path, PathBuf};

use counterseal_core::{
    decode_field, encode_field, Blake3Hash, CoreError, RawSignature, SigningKeyPair, Tag,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::properties::{read_properties, required, write_properties, Properties};

/// Suffix appended to the snapshot file name.
pub const IMAGE_EXTENSION: &str = ".seal";

const CHECKSUM_KEY: &str = "checksum";
const COUNTER_KEY: &str = "counter";
const TAG_KEY: &str = "tag";
const HEADER: &str = "counterseal snapshot";
const READ_CHUNK: usize = 64 * 1024;

/// What a snapshot was committed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub checksum: Blake3Hash,
    /// Counter the snapshot's tag was committed at.
    pub counter: u64,
    pub tag: Tag,
}

impl ImageInfo {
    /// Hash `snapshot` and build its tag for `counter`.
    pub async fn compute(
        snapshot: &Path,
        counter: u64,
        signer: Option<&SigningKeyPair>,
    ) -> Result<Self> {
        let checksum = checksum_file(snapshot).await?;
        let tag = image_tag(&checksum, counter, signer)?;
        Ok(Self {
            checksum,
            counter,
            tag,
        })
    }

    fn to_properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert(CHECKSUM_KEY.into(), encode_field(self.checksum.as_bytes()));
        properties.insert(COUNTER_KEY.into(), self.counter.to_string());
        properties.insert(TAG_KEY.into(), encode_field(self.tag.as_bytes()));
        properties
    }

    fn from_properties(properties: &Properties) -> Result<Self> {
        let checksum: [u8; 32] = decode_field(required(properties, CHECKSUM_KEY)?)?
            .try_into()
            .map_err(|_| StoreError::MalformedMetadata("checksum must be 32 bytes".into()))?;
        let counter = required(properties, COUNTER_KEY)?
            .parse()
            .map_err(|e| StoreError::MalformedMetadata(format!("counter: {e}")))?;
        let tag = Tag::new(decode_field(required(properties, TAG_KEY)?)?);
        Ok(Self {
            checksum: Blake3Hash::from_bytes(checksum),
            counter,
            tag,
        })
    }
}

fn bound_bytes(checksum: &Blake3Hash, counter: u64) -> Vec<u8> {
    let mut bytes = checksum.as_bytes().to_vec();
    bytes.extend_from_slice(&counter.to_le_bytes());
    bytes
}

/// Tag committing a snapshot with `checksum` at `counter`.
///
/// With a signing key this is the signature over `checksum || counter`
/// (little-endian), otherwise the digest of the same bytes.
pub fn image_tag(
    checksum: &Blake3Hash,
    counter: u64,
    signer: Option<&SigningKeyPair>,
) -> std::result::Result<Tag, CoreError> {
    let bytes = bound_bytes(checksum, counter);
    match signer.filter(|s| s.can_sign()) {
        Some(signer) => Ok(Tag::from(signer.sign(&bytes)?.as_bytes().to_vec())),
        None => Ok(Tag::from(Blake3Hash::hash(&bytes).as_bytes().to_vec())),
    }
}

/// Check that `info.tag` binds `info.checksum` to `info.counter`.
///
/// With a public key the tag must be a valid signature; without one it must
/// equal the digest form.
pub fn verify_image_tag(info: &ImageInfo, signer: Option<&SigningKeyPair>) -> bool {
    let bytes = bound_bytes(&info.checksum, info.counter);
    match signer.filter(|s| s.public_key().is_some()) {
        Some(signer) => RawSignature::try_from(info.tag.as_bytes())
            .map(|signature| signer.verify(&bytes, &signature))
            .unwrap_or(false),
        None => info.tag.as_bytes() == Blake3Hash::hash(&bytes).as_bytes(),
    }
}

/// Stream a file through Blake3.
pub async fn checksum_file(path: &Path) -> Result<Blake3Hash> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// `<snapshot>.seal`
pub fn sidecar_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_owned();
    name.push(IMAGE_EXTENSION);
    PathBuf::from(name)
}

/// Write the sidecar for `snapshot`.
pub async fn save_image_info(snapshot: &Path, info: &ImageInfo) -> Result<()> {
    let path = sidecar_path(snapshot);
    write_properties(&path, HEADER, &info.to_properties()).await?;
    info!(
        snapshot = %snapshot.display(),
        counter = info.counter,
        tag = %encode_field(info.tag.as_bytes()),
        "saved snapshot sidecar"
    );
    Ok(())
}

/// Read the sidecar for `snapshot` and check the snapshot is unchanged.
pub async fn load_image_info(snapshot: &Path) -> Result<ImageInfo> {
    let path = sidecar_path(snapshot);
    let properties = read_properties(&path).await?.ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no sidecar at {}", path.display()),
        ))
    })?;
    let info = ImageInfo::from_properties(&properties)?;

    let current = checksum_file(snapshot).await?;
    if current != info.checksum {
        warn!(snapshot = %snapshot.display(), "snapshot changed since its sidecar was written");
        return Err(StoreError::ImageChecksumMismatch {
            path: snapshot.display().to_string(),
        });
    }
    debug!(snapshot = %snapshot.display(), counter = info.counter, "loaded snapshot sidecar");
    Ok(info)
}

/// Load the sidecar and check its tag.
pub async fn verify_image_info(snapshot: &Path, signer: Option<&SigningKeyPair>) -> Result<bool> {
    let info = load_image_info(snapshot).await?;
    Ok(verify_image_tag(&info, signer))
}

/// Move the sidecar along with a renamed snapshot.
pub async fn rename_image_info(from: &Path, to: &Path) -> Result<()> {
    tokio::fs::rename(sidecar_path(from), sidecar_path(to)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn snapshot(dir: &Path, contents: &[u8]) -> PathBuf {
        let path = dir.join("snapshot_0000042");
        tokio::fs::write(&path, contents).await.unwrap();
        path
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/data/current/snapshot_7")),
            PathBuf::from("/data/current/snapshot_7.seal")
        );
    }

    #[tokio::test]
    async fn test_checksum_matches_hash() {
        let dir = tempfile::tempdir().unwrap();
        let contents = vec![0xAB; READ_CHUNK * 2 + 17];
        let path = snapshot(dir.path(), &contents).await;
        assert_eq!(checksum_file(&path).await.unwrap(), Blake3Hash::hash(&contents));
    }

    #[test]
    fn test_image_tag_binds_counter() {
        let checksum = Blake3Hash::hash(b"image");
        let signer = SigningKeyPair::generate();

        let signed = image_tag(&checksum, 5, Some(&signer)).unwrap();
        assert_eq!(signed.len(), 64);
        let info = ImageInfo { checksum, counter: 5, tag: signed };
        assert!(verify_image_tag(&info, Some(&signer)));
        assert!(!verify_image_tag(&ImageInfo { counter: 6, ..info.clone() }, Some(&signer)));
        assert!(!verify_image_tag(&info, Some(&SigningKeyPair::generate())));

        let digest = image_tag(&checksum, 5, None).unwrap();
        assert_eq!(digest.len(), 32);
        let info = ImageInfo { checksum, counter: 5, tag: digest };
        assert!(verify_image_tag(&info, None));
        assert!(!verify_image_tag(&ImageInfo { counter: 4, ..info }, None));
    }

    #[test]
    fn test_keyless_signer_falls_back_to_digest() {
        let checksum = Blake3Hash::hash(b"image");
        assert_eq!(
            image_tag(&checksum, 1, Some(&SigningKeyPair::empty())).unwrap(),
            image_tag(&checksum, 1, None).unwrap()
        );
    }

    #[tokio::test]
    async fn test_save_load_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot(dir.path(), b"namespace").await;
        let signer = SigningKeyPair::generate();

        let info = ImageInfo::compute(&path, 9, Some(&signer)).await.unwrap();
        save_image_info(&path, &info).await.unwrap();

        assert_eq!(load_image_info(&path).await.unwrap(), info);
        assert!(verify_image_info(&path, Some(&signer)).await.unwrap());
    }

    #[tokio::test]
    async fn test_modified_snapshot_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot(dir.path(), b"namespace").await;
        let info = ImageInfo::compute(&path, 3, None).await.unwrap();
        save_image_info(&path, &info).await.unwrap();

        tokio::fs::write(&path, b"namespace, edited").await.unwrap();
        let err = load_image_info(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::ImageChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot(dir.path(), b"namespace").await;
        let err = load_image_info(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_rename_moves_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot(dir.path(), b"namespace").await;
        let info = ImageInfo::compute(&path, 1, None).await.unwrap();
        save_image_info(&path, &info).await.unwrap();

        let renamed = dir.path().join("snapshot_final");
        tokio::fs::rename(&path, &renamed).await.unwrap();
        rename_image_info(&path, &renamed).await.unwrap();

        assert!(!sidecar_path(&path).exists());
        assert_eq!(load_image_info(&renamed).await.unwrap(), info);
    }
}
