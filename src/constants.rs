//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! Label keys, annotation keys and finalizer names are part of the public
//! contract with other tooling (kubectl users, the `kfgctl` CLI, dashboards),
//! so they live here rather than next to the code that writes them.

/// Prefix for every label, annotation and finalizer owned by the operator
pub const KONFIGURE_PREFIX: &str = "konfigure.giantswarm.io";

/// Value of the `generated-by` ownership label
pub const GENERATED_BY_VALUE: &str = "konfigure-operator";

pub const GENERATED_BY_LABEL: &str = "konfigure.giantswarm.io/generated-by";
pub const OWNER_API_GROUP_LABEL: &str = "konfigure.giantswarm.io/ownerApiGroup";
pub const OWNER_API_VERSION_LABEL: &str = "konfigure.giantswarm.io/ownerApiVersion";
pub const OWNER_KIND_LABEL: &str = "konfigure.giantswarm.io/ownerKind";
pub const OWNER_NAME_LABEL: &str = "konfigure.giantswarm.io/ownerName";
pub const OWNER_NAMESPACE_LABEL: &str = "konfigure.giantswarm.io/ownerNamespace";
pub const REVISION_LABEL: &str = "konfigure.giantswarm.io/revision";

/// Per-object opt-out label; `disabled` leaves an existing object untouched
pub const RECONCILE_LABEL: &str = "konfigure.giantswarm.io/reconcile";
pub const RECONCILE_ENABLED_VALUE: &str = "enabled";
pub const RECONCILE_DISABLED_VALUE: &str = "disabled";

/// Label selecting Secrets that carry AGE identities
pub const SOPS_KEYS_LABEL: &str = "konfigure.giantswarm.io/data";
pub const SOPS_KEYS_LABEL_VALUE: &str = "sops-keys";

/// Secret data entries with this suffix are treated as AGE identities
pub const AGE_KEY_SUFFIX: &str = ".agekey";

/// Annotation written by `kfgctl reconcile` to force a reconciliation
pub const RECONCILE_REQUESTED_AT_ANNOTATION: &str =
    "konfigure.giantswarm.io/reconcile-requested-at";

/// Finalizer guarding cleanup of rendered ConfigMaps and Secrets
pub const FINALIZER: &str = "konfigure.giantswarm.io/finalizer";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "konfigure-operator";

/// Keys of the rendered payloads
pub const CONFIGMAP_VALUES_KEY: &str = "configmap-values.yaml";
pub const SECRET_VALUES_KEY: &str = "secret-values.yaml";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default namespace the operator runs in
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "konfigure-system";

/// Default root of the artifact cache
pub const DEFAULT_CACHE_DIR: &str = "/tmp/konfigure-cache";

/// Default Flux source-controller service host
pub const DEFAULT_SOURCE_CONTROLLER_URL: &str = "source-controller.flux-system.svc";

/// Default artifact download timeout (seconds)
pub const DEFAULT_ARTIFACT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Number of extracted revisions kept per GitRepository
pub const DEFAULT_ARTIFACT_REVISIONS_TO_KEEP: usize = 3;

/// Immediate retries on a 409 conflict when writing a ConfigMap or Secret
pub const DEFAULT_APPLY_CONFLICT_RETRIES: u32 = 3;

/// Default exponential backoff starting value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Fibonacci backoff bounds for unexpected reconciliation errors (minutes)
pub const ERROR_BACKOFF_MIN_MINUTES: u64 = 1;
pub const ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Marker file in the per-GitRepository cache holding the last extracted archive name
pub const LAST_ARCHIVE_FILE: &str = "lastarchive";

/// Revision reported when the artifact marker cannot be read
pub const UNKNOWN_REVISION: &str = "unknown";
