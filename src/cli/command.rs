//! The CLI's command surface: uniform glue over the store and MMR core (spec §1,
//! SPEC_FULL §4.11). None of this participates in the core's testable properties —
//! it exists only so the core is reachable from a terminal.

use std::path::PathBuf;

pub enum Command {
    /// `service create <name>`
    ServiceCreate { name: String },
    /// `service list`
    ServiceList,
    /// `service delete <name>`
    ServiceDelete { name: String },
    /// `service append <name> <hex-blob>`: hashes the decoded blob via `H` and
    /// appends the resulting digest.
    ServiceAppend { name: String, blob_hex: String },
    /// `service root <name>`
    ServiceRoot { name: String },
    /// `service prove <name> <hex-blob>`: hashes the decoded blob and builds the
    /// server-side inclusion bundle for it.
    ServiceProve { name: String, blob_hex: String },
    /// `service verify <bundle.json>`
    ServiceVerify { bundle_path: PathBuf },
    /// `container stat <env-path> <name>`
    ContainerStat { env_path: PathBuf, name: String },
    /// `feature list`
    FeatureList,
    /// `feature enable <name>`
    FeatureEnable { name: String },
    /// `feature disable <name>`
    FeatureDisable { name: String },
}
