//! The Session: one writer's connection to its ledger counter.
//!
//! A session is built once at startup from a transport and a metadata store
//! and owns everything the host needs: the verified ledger client, the
//! persisted handle and the client signing keys. Aggregators borrow the
//! client from it.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use counterseal_chain::Aggregator;
use counterseal_client::{fetch_identity, LedgerClient, Transport};
use counterseal_core::{encode_field, Handle, Receipt, ServiceIdentity, SigningKeyPair, Tag};
use counterseal_store::{
    save_image_info, verify_image_info, IdentityRecord, ImageInfo, MetadataStore,
};

use crate::config::SealConfig;
use crate::error::{Result, SessionError};

/// An explicitly owned ledger session.
pub struct Session<T: Transport, S: MetadataStore> {
    client: Arc<LedgerClient<T>>,
    store: S,
    record: IdentityRecord,
    signer: Arc<SigningKeyPair>,
    config: SealConfig,
}

impl<T: Transport, S: MetadataStore> Session<T, S> {
    /// Start from persisted metadata.
    ///
    /// On first run a fresh handle and signing keys are drawn and saved to
    /// every location. The counter is then resynced; a ledger that does not
    /// know the handle yet leaves the session uninitialized.
    pub async fn open(transport: T, store: S, config: SealConfig) -> Result<Self> {
        let service = fetch_identity(&transport, config.public_key_format).await?;

        let (record, signer) = match store.load().await? {
            Some(saved) if saved.is_complete() => {
                if !saved.matches_service(&service) {
                    return Err(identity_changed(&saved, &service));
                }
                let mut signer = saved.signing_key_pair()?;
                let mut record = saved;
                if !signer.can_sign() {
                    info!("generating client signing keys");
                    signer = SigningKeyPair::generate();
                    record = IdentityRecord::new(&service, handle_of(&record)?, &signer);
                    store.save(&record).await?;
                }
                (record, signer)
            }
            _ => {
                let signer = SigningKeyPair::generate();
                let record = IdentityRecord::new(&service, Handle::random(), &signer);
                store.save(&record).await?;
                info!(handle = ?record.handle, "created new identity record");
                (record, signer)
            }
        };

        let handle = handle_of(&record)?;
        let client = LedgerClient::new(transport, Arc::new(service), handle);
        let session = Self {
            client: Arc::new(client),
            store,
            record,
            signer: Arc::new(signer),
            config,
        };

        match session.client.read_latest().await {
            Ok(receipt) => info!(handle = %handle, counter = receipt.counter(), "resynced counter"),
            Err(e) if e.is_missing_counter() => debug!(handle = %handle, "counter not created yet"),
            Err(e) => {
                warn!(handle = %handle, error = %e, "resync on open failed");
                return Err(e.into());
            }
        }
        Ok(session)
    }

    /// Start over: fresh handle and keys, counter created with `initial_tag`.
    ///
    /// The record is saved only once the ledger has accepted the counter.
    pub async fn format(transport: T, store: S, config: SealConfig, initial_tag: Tag) -> Result<Self> {
        let service = fetch_identity(&transport, config.public_key_format).await?;
        let handle = Handle::random();
        let signer = SigningKeyPair::generate();
        let record = IdentityRecord::new(&service, handle, &signer);

        let client = LedgerClient::new(transport, Arc::new(service), handle);
        client.create_counter(initial_tag).await?;
        store.save(&record).await?;
        info!(handle = %handle, "formatted");

        Ok(Self {
            client: Arc::new(client),
            store,
            record,
            signer: Arc::new(signer),
            config,
        })
    }

    /// Write the identity record to every storage location again.
    pub async fn save(&self) -> Result<()> {
        self.store.save(&self.record).await?;
        Ok(())
    }

    /// Create the counter at 0 holding `initial_tag`.
    pub async fn initialize(&self, initial_tag: Tag) -> Result<Receipt> {
        Ok(self.client.create_counter(initial_tag).await?)
    }

    /// Commit `tag` at the next counter.
    pub async fn increment(&self, tag: Tag) -> Result<Receipt> {
        Ok(self.client.increment(tag).await?)
    }

    /// Verified read of the ledger's latest `(counter, tag)`.
    pub async fn latest(&self) -> Result<(u64, Tag)> {
        if !self.is_initialized().await {
            return Err(SessionError::NotInitialized);
        }
        let receipt = self.client.read_latest().await?;
        Ok((receipt.counter(), receipt.tag().clone()))
    }

    /// Counter the next commit will produce.
    pub async fn expected_counter(&self) -> Result<u64> {
        Ok(self.client.expected_counter().await?)
    }

    /// Re-read the counter, e.g. after an increment whose outcome is unknown.
    pub async fn resync(&self) -> Result<Receipt> {
        Ok(self.client.read_latest().await?)
    }

    pub async fn is_initialized(&self) -> bool {
        self.client.state().await.is_known()
    }

    /// Client signing keys.
    pub fn signer(&self) -> &Arc<SigningKeyPair> {
        &self.signer
    }

    pub fn client(&self) -> &Arc<LedgerClient<T>> {
        &self.client
    }

    pub fn handle(&self) -> &Handle {
        self.client.handle()
    }

    pub fn record(&self) -> &IdentityRecord {
        &self.record
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SealConfig {
        &self.config
    }

    fn tag_signer(&self) -> Option<&SigningKeyPair> {
        Some(self.signer.as_ref()).filter(|s| self.config.sign_tags && s.can_sign())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregation
    // ─────────────────────────────────────────────────────────────────────────

    /// Aggregator continuing after `(base_counter, base_tag)`.
    pub fn aggregator(&self, base_counter: u64, base_tag: Tag) -> Aggregator<T> {
        Aggregator::new(
            Arc::clone(&self.client),
            self.config.aggregator_config(),
            base_counter,
            base_tag,
        )
        .with_signer(Arc::clone(&self.signer))
    }

    /// Aggregator continuing after a loaded snapshot.
    pub fn aggregator_for_image(&self, info: &ImageInfo) -> Aggregator<T> {
        self.aggregator(info.counter, info.tag.clone())
    }

    /// Commit a freshly written snapshot and write its sidecar.
    ///
    /// Pending records must be flushed first; the check happens before any
    /// network call.
    pub async fn seal_image(&self, aggregator: &Aggregator<T>, snapshot: &Path) -> Result<ImageInfo> {
        let counter = aggregator.expected_counter().await;
        let info = ImageInfo::compute(snapshot, counter, self.tag_signer()).await?;
        aggregator.record_image(info.tag.clone()).await?;
        save_image_info(snapshot, &info).await?;
        Ok(info)
    }

    /// Check a snapshot against its sidecar and its tag.
    pub async fn verify_image(&self, snapshot: &Path) -> Result<bool> {
        let valid = verify_image_info(snapshot, self.tag_signer()).await?;
        if !valid {
            warn!(snapshot = %snapshot.display(), "snapshot tag does not verify");
        }
        Ok(valid)
    }
}

fn handle_of(record: &IdentityRecord) -> Result<Handle> {
    record.handle.ok_or(SessionError::NotInitialized)
}

fn identity_changed(saved: &IdentityRecord, service: &ServiceIdentity) -> SessionError {
    SessionError::IdentityChanged {
        saved: encode_field(&saved.identity),
        ledger: encode_field(service.identity()),
    }
}
