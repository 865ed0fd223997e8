//! Compute side of a frame: the active strategy and sweep encoding.

use std::collections::HashMap;

use crate::error::{FrameError, GpuError};
use crate::grid::Neighborhood;
use crate::scheduler::{FramePlan, Pass};
use crate::strategy::{Strategy, StrategyKind};

use super::buffers::DeviceResources;

/// Holds exactly one compiled strategy at a time.
pub struct ClothCompute {
    neighborhood: Neighborhood,
    overrides: HashMap<StrategyKind, String>,
    active: Option<Strategy>,
}

impl ClothCompute {
    pub fn new(neighborhood: Neighborhood) -> Self {
        Self {
            neighborhood,
            overrides: HashMap::new(),
            active: None,
        }
    }

    /// Use `source` instead of the built-in kernel for `kind` from the next
    /// activation on. The text must follow the shared binding contract.
    pub fn set_kernel_source(&mut self, kind: StrategyKind, source: String) {
        self.overrides.insert(kind, source);
    }

    /// Compile `kind` and replace the active strategy.
    ///
    /// On failure the previous strategy is dropped too, so frames asking for
    /// either report a missing pipeline rather than running a stale kernel.
    pub fn activate(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        kind: StrategyKind,
    ) -> Result<(), GpuError> {
        self.active = None;
        let mut strategy = match self.overrides.get(&kind) {
            Some(source) => {
                let mut strategy = Strategy::new(kind);
                strategy.bind(source.clone());
                strategy
            }
            None => Strategy::builtin(kind, self.neighborhood),
        };
        strategy.create_pipeline(device, layout)?;
        self.active = Some(strategy);
        Ok(())
    }

    pub fn active_kind(&self) -> Option<StrategyKind> {
        self.active.as_ref().map(Strategy::kind)
    }

    /// Record every sweep of `plan`, one compute pass each.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        resources: &DeviceResources,
        plan: &FramePlan,
    ) -> Result<(), FrameError> {
        let sweeps = plan.sweeps();
        if sweeps.is_empty() {
            return Ok(());
        }

        let compiled = self
            .active
            .as_ref()
            .filter(|s| s.kind() == plan.strategy)
            .and_then(Strategy::compiled)
            .ok_or(FrameError::MissingPipeline(plan.strategy))?;

        for sweep in sweeps {
            let pipeline = match sweep.pass {
                Pass::Integrate => &compiled.integrate,
                Pass::Constrain => compiled
                    .constrain
                    .as_ref()
                    .ok_or(FrameError::MissingPipeline(plan.strategy))?,
            };

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Cloth Sweep"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, resources.bind_group(sweep.read), &[]);
            pass.dispatch_workgroups(plan.workgroups, 1, 1);
        }
        Ok(())
    }
}
