use layerport_core::BackendId;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Backends tried for each layer, most preferred first.
    pub backend_preferences: Vec<BackendId>,
    /// Upper bound on workloads running at once in concurrent execution.
    pub max_concurrency: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend_preferences: vec![BackendId::REFERENCE],
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl RuntimeConfig {
    pub fn with_backend_preferences(mut self, backends: impl IntoIterator<Item = BackendId>) -> Self {
        self.backend_preferences = backends.into_iter().collect();
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}
