//! Engine configuration

pub const DEFAULT_MAX_SIGNERS: usize = 50;
pub const DEFAULT_SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Verify the stored evidence chain before accepting a mutating command.
    pub verify_chain_on_load: bool,
    pub max_signers: usize,
    /// Signer id recorded on document-level evidence such as `created` and `sent`.
    pub system_actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_chain_on_load: true,
            max_signers: DEFAULT_MAX_SIGNERS,
            system_actor: DEFAULT_SYSTEM_ACTOR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_verify_chain_on_load(mut self, verify: bool) -> Self {
        self.verify_chain_on_load = verify;
        self
    }
    pub fn set_max_signers(mut self, max: usize) -> Self {
        self.max_signers = max;
        self
    }
    pub fn set_system_actor(mut self, actor: &str) -> Self {
        self.system_actor = actor.to_string();
        self
    }
}
