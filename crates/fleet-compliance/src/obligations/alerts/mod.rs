//! Periodic due-date scan, pending-alert bookkeeping, and notice delivery.

pub mod directory;
pub mod domain;
pub mod notifier;
pub mod scanner;
pub mod scheduler;
pub mod store;

pub use directory::{AssetDirectory, Contact, DirectoryError, DriverContact, StaticAssetDirectory};
pub use domain::{
    alert_message, AlertDraft, AlertFilter, AlertId, AlertInsert, AlertRecord, AlertState,
    AudienceKey, DriverId,
};
pub use notifier::{
    DeliveryError, DeliveryQueue, DeliveryStats, DeliveryWorker, Notice, Notifier,
    TEMPLATE_OBLIGATION_DUE, TEMPLATE_RENEWAL_CONFIRMED,
};
pub use scanner::{AlertScanner, ScanError, ScanReport};
pub use scheduler::{ScanJob, ScanScheduler, SchedulerHandle, ShutdownSignal};
pub use store::{AlertStore, AlertStoreError, MemoryAlertStore};
