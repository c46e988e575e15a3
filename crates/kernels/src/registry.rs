//! Kernel registry for lookup and discovery.

use crate::config::{Capability, KernelVariant};
use crate::error::{BenchError, Result};
use crate::kernel::{DynKernel, Kernel};
use crate::matmul::{BlockedMatmul, ReferenceMatmul, SimdMatmul};
use crate::memory::{ReferenceCopy, SimdCopy, SliceCopy};
use crate::rmw::{ReferenceRmw, WrappedRmw};
use crate::vector::{ReferenceVectorAdd, SimdVectorAdd, UnrolledVectorAdd};
use std::sync::Arc;
use tracing::debug;

/// Named kernels in registration order.
///
/// Names are unique across capabilities and a registered kernel can never be
/// replaced.
#[derive(Default, Clone)]
pub struct KernelRegistry {
    kernels: Vec<DynKernel>,
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.kernels.iter().map(|k| k.name()))
            .finish()
    }
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
        }
    }

    /// Every built-in kernel, reference variant first within each capability.
    pub fn with_default_kernels() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(ReferenceMatmul::new())?;
        registry.register(BlockedMatmul::new())?;
        registry.register(SimdMatmul::new())?;
        registry.register(ReferenceVectorAdd)?;
        registry.register(UnrolledVectorAdd)?;
        registry.register(SimdVectorAdd)?;
        registry.register(ReferenceCopy)?;
        registry.register(SliceCopy)?;
        registry.register(SimdCopy)?;
        registry.register(ReferenceRmw)?;
        registry.register(WrappedRmw)?;
        Ok(registry)
    }

    pub fn register<K>(&mut self, kernel: K) -> Result<()>
    where
        K: Kernel + 'static,
    {
        self.register_shared(Arc::new(kernel))
    }

    pub fn register_shared(&mut self, kernel: DynKernel) -> Result<()> {
        if self.find(kernel.name()).is_some() {
            return Err(BenchError::DuplicateKernel(kernel.name().to_string()));
        }
        debug!(
            kernel = kernel.name(),
            capability = %kernel.capability(),
            variant = kernel.variant().as_str(),
            "registered kernel"
        );
        self.kernels.push(kernel);
        Ok(())
    }

    pub fn kernels(&self) -> &[DynKernel] {
        &self.kernels
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn kernels_for(&self, capability: Capability) -> impl Iterator<Item = &DynKernel> + '_ {
        self.kernels
            .iter()
            .filter(move |kernel| kernel.capability() == capability)
    }

    /// The first registered reference kernel of `capability`.
    pub fn reference_for(&self, capability: Capability) -> Option<DynKernel> {
        self.kernels_for(capability)
            .find(|kernel| kernel.variant() == KernelVariant::Reference)
            .map(Arc::clone)
    }

    pub fn find(&self, name: &str) -> Option<DynKernel> {
        self.kernels
            .iter()
            .find(|kernel| kernel.name() == name)
            .map(Arc::clone)
    }

    /// A registry holding only the named kernels of `capability` plus its
    /// reference, preserving registration order.
    pub fn select(&self, capability: Capability, names: &[String]) -> Result<Self> {
        let mut selected = Self::new();
        for kernel in self.kernels_for(capability) {
            let wanted = names.is_empty()
                || kernel.variant() == KernelVariant::Reference
                || names.iter().any(|name| name == kernel.name());
            if wanted {
                selected.register_shared(Arc::clone(kernel))?;
            }
        }
        for name in names {
            if selected.find(name).is_none() {
                return Err(BenchError::Usage(format!(
                    "unknown {capability} kernel `{name}`"
                )));
            }
        }
        Ok(selected)
    }
}
