//! Explicitly constructed job-type → processor registry.
//!
//! The registry is built once at startup and injected wherever it is needed;
//! there is no global lookup table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::processors::deliveries::DeliveryProcessor;
use crate::processors::invoices::InvoiceProcessor;
use crate::processors::service_orders::ServiceOrderProcessor;
use crate::processors::trait_::RecordProcessor;
use crate::processors::JobType;

pub struct ProcessorRegistry {
    processors: HashMap<JobType, Arc<dyn RecordProcessor>>,
}

impl ProcessorRegistry {
    /// Empty registry, for tests that want to register selectively.
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Registry with all built-in processors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ServiceOrderProcessor));
        registry.register(Arc::new(InvoiceProcessor));
        registry.register(Arc::new(DeliveryProcessor));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn RecordProcessor>) {
        self.processors.insert(processor.job_type(), processor);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn RecordProcessor>> {
        self.processors.get(&job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.processors.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_job_type() {
        let registry = ProcessorRegistry::with_defaults();
        for job_type in JobType::all() {
            let processor = registry.get(job_type).expect("processor registered");
            assert_eq!(processor.job_type(), job_type);
        }
    }

    #[test]
    fn empty_registry_returns_none() {
        let registry = ProcessorRegistry::new();
        assert!(registry.get(JobType::Invoices).is_none());
    }
}
