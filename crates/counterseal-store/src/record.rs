//! The persisted identity record.

use std::fmt;

use bytes::Bytes;
use counterseal_core::canonical::{decode_optional, encode_optional};
use counterseal_core::{
    decode_field, encode_field, CoreError, Handle, PublicKeyFormat, ServiceIdentity,
    SigningKeyPair,
};

use crate::error::{Result, StoreError};
use crate::properties::{required, Properties};

pub const IDENTITY_KEY: &str = "identity";
pub const PUBLIC_KEY_KEY: &str = "publicKey";
pub const HANDLE_KEY: &str = "handle";
pub const SIGN_PUBLIC_KEY_KEY: &str = "signPublicKey";
pub const SIGN_PRIVATE_KEY_KEY: &str = "signPrivateKey";

/// Ledger identity, counter handle and client signing keys.
///
/// Byte fields are stored base64url; absent values as `null`.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub identity: Bytes,
    pub public_key: Bytes,
    pub handle: Option<Handle>,
    pub sign_public_key: Option<Bytes>,
    pub sign_private_key: Option<Bytes>,
}

impl IdentityRecord {
    /// Record for `service`, naming `handle` and holding `signer`'s halves.
    pub fn new(service: &ServiceIdentity, handle: Handle, signer: &SigningKeyPair) -> Self {
        Self {
            identity: Bytes::copy_from_slice(service.identity()),
            public_key: Bytes::copy_from_slice(service.public_key()),
            handle: Some(handle),
            sign_public_key: signer.public_key_bytes().map(Bytes::from),
            sign_private_key: signer.private_key_bytes().map(Bytes::from),
        }
    }

    /// Whether the record names a counter.
    pub fn is_complete(&self) -> bool {
        !self.identity.is_empty() && !self.public_key.is_empty() && self.handle.is_some()
    }

    /// The ledger this record was written for.
    pub fn service_identity(&self) -> std::result::Result<ServiceIdentity, CoreError> {
        ServiceIdentity::from_parts(
            self.identity.clone(),
            self.public_key.clone(),
            PublicKeyFormat::Auto,
        )
    }

    /// Whether `service` is the ledger this record was written for.
    ///
    /// A stored key that no longer parses never matches.
    pub fn matches_service(&self, service: &ServiceIdentity) -> bool {
        self.service_identity()
            .map(|saved| saved.same_service(service))
            .unwrap_or(false)
    }

    /// Rebuild the client signing key pair.
    pub fn signing_key_pair(&self) -> std::result::Result<SigningKeyPair, CoreError> {
        SigningKeyPair::from_parts(
            self.sign_public_key.as_deref(),
            self.sign_private_key.as_deref(),
        )
    }

    /// First field on which `other` disagrees, among identity, public key
    /// and handle.
    pub fn disagreement(&self, other: &IdentityRecord) -> Option<&'static str> {
        if self.identity != other.identity {
            Some(IDENTITY_KEY)
        } else if self.public_key != other.public_key {
            Some(PUBLIC_KEY_KEY)
        } else if self.handle != other.handle {
            Some(HANDLE_KEY)
        } else {
            None
        }
    }

    pub fn to_properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert(IDENTITY_KEY.into(), encode_field(&self.identity));
        properties.insert(PUBLIC_KEY_KEY.into(), encode_field(&self.public_key));
        properties.insert(
            HANDLE_KEY.into(),
            encode_optional(self.handle.as_ref().map(|h| &h.as_bytes()[..])),
        );
        properties.insert(
            SIGN_PUBLIC_KEY_KEY.into(),
            encode_optional(self.sign_public_key.as_deref()),
        );
        properties.insert(
            SIGN_PRIVATE_KEY_KEY.into(),
            encode_optional(self.sign_private_key.as_deref()),
        );
        properties
    }

    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let identity = decode_field(required(properties, IDENTITY_KEY)?)?;
        let public_key = decode_field(required(properties, PUBLIC_KEY_KEY)?)?;
        let handle = optional(properties, HANDLE_KEY)?
            .map(|bytes| Handle::try_from(bytes.as_slice()))
            .transpose()?;

        Ok(Self {
            identity: identity.into(),
            public_key: public_key.into(),
            handle,
            sign_public_key: optional(properties, SIGN_PUBLIC_KEY_KEY)?.map(Bytes::from),
            sign_private_key: optional(properties, SIGN_PRIVATE_KEY_KEY)?.map(Bytes::from),
        })
    }
}

/// A missing key reads as absent, like the literal `null`.
fn optional(properties: &Properties, key: &str) -> Result<Option<Vec<u8>>> {
    match properties.get(key) {
        Some(value) => Ok(decode_optional(value)?),
        None => Ok(None),
    }
}

/// Merge what each storage location holds into one record.
///
/// No location holding a record means nothing was saved yet. Otherwise every
/// location must hold one and all must agree.
pub fn reconcile(
    entries: Vec<(String, Option<IdentityRecord>)>,
) -> Result<Option<IdentityRecord>> {
    let mut entries = entries.into_iter();
    let (first_location, first) = match entries.next() {
        Some(entry) => entry,
        None => return Ok(None),
    };

    for (location, record) in entries {
        let field = match (&first, &record) {
            (None, None) => continue,
            (Some(first), Some(record)) => match first.disagreement(record) {
                Some(field) => field,
                None => continue,
            },
            _ => "record",
        };
        tracing::error!(
            first = %first_location,
            other = %location,
            field,
            "storage locations disagree"
        );
        return Err(StoreError::InconsistentMetadata { location, field });
    }

    Ok(first)
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("identity", &encode_field(&self.identity))
            .field("handle", &self.handle)
            .field("can_sign", &self.sign_private_key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{parse_properties, render_properties};

    fn sample() -> (ServiceIdentity, IdentityRecord) {
        let ledger_keys = SigningKeyPair::generate();
        let service = ServiceIdentity::from_parts(
            &b"ledger-1"[..],
            ledger_keys.public_key_bytes().unwrap(),
            PublicKeyFormat::Compressed,
        )
        .unwrap();
        let record = IdentityRecord::new(&service, Handle::random(), &SigningKeyPair::generate());
        (service, record)
    }

    #[test]
    fn test_properties_roundtrip() {
        let (_, record) = sample();
        let text = render_properties("seal", &record.to_properties());
        let parsed = IdentityRecord::from_properties(&parse_properties(&text).unwrap()).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_complete());
        assert!(parsed.signing_key_pair().unwrap().can_sign());
    }

    #[test]
    fn test_null_fields() {
        let (service, _) = sample();
        let mut record = IdentityRecord::new(&service, Handle::random(), &SigningKeyPair::empty());
        record.handle = None;

        let properties = record.to_properties();
        assert_eq!(properties[HANDLE_KEY], "null");
        assert_eq!(properties[SIGN_PRIVATE_KEY_KEY], "null");

        let parsed = IdentityRecord::from_properties(&properties).unwrap();
        assert_eq!(parsed.handle, None);
        assert!(!parsed.is_complete());
        assert!(!parsed.signing_key_pair().unwrap().can_sign());
    }

    #[test]
    fn test_missing_identity_is_malformed() {
        let (_, record) = sample();
        let mut properties = record.to_properties();
        properties.remove(IDENTITY_KEY);
        let err = IdentityRecord::from_properties(&properties).unwrap_err();
        assert!(matches!(err, StoreError::MalformedMetadata(_)));
    }

    #[test]
    fn test_bad_handle_length() {
        let (_, record) = sample();
        let mut properties = record.to_properties();
        properties.insert(HANDLE_KEY.into(), encode_field(b"short"));
        let err = IdentityRecord::from_properties(&properties).unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::InvalidHandle(5))));
    }

    #[test]
    fn test_matches_service() {
        let (service, record) = sample();
        assert!(record.matches_service(&service));

        let (other, _) = sample();
        assert!(!record.matches_service(&other));
    }

    #[test]
    fn test_reconcile() {
        let (_, record) = sample();
        let loc = |name: &str, r: Option<IdentityRecord>| (name.to_string(), r);

        assert_eq!(reconcile(vec![]).unwrap(), None);
        assert_eq!(reconcile(vec![loc("a", None), loc("b", None)]).unwrap(), None);
        assert_eq!(
            reconcile(vec![loc("a", Some(record.clone())), loc("b", Some(record.clone()))]).unwrap(),
            Some(record.clone())
        );

        let err = reconcile(vec![loc("a", Some(record.clone())), loc("b", None)]).unwrap_err();
        assert!(matches!(err, StoreError::InconsistentMetadata { field: "record", .. }));

        let mut moved = record.clone();
        moved.handle = Some(Handle::random());
        let err = reconcile(vec![loc("a", Some(record.clone())), loc("b", Some(moved))]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InconsistentMetadata { ref location, field: "handle" } if location == "b"
        ));

        // Signing keys are not part of the consistency check.
        let mut rekeyed = record.clone();
        rekeyed.sign_private_key = None;
        assert!(reconcile(vec![loc("a", Some(record)), loc("b", Some(rekeyed))]).is_ok());
    }
}
