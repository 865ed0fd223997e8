//! Physics strategies: which compute kernel integrates the cloth.
//!
//! A [`Strategy`] moves through three states:
//!
//! ```text
//! Unbound --bind(source)--> Bound --create_pipeline(device)--> Compiled
//! ```
//!
//! Compilation happens once per activation. The scheduler keeps the compiled
//! strategy and only replaces it when the user picks a different one, never
//! per frame.

use std::fmt;
use std::str::FromStr;

use crate::error::GpuError;
use crate::grid::Neighborhood;
use crate::shader::{self, CONSTRAIN_ENTRY, INTEGRATE_ENTRY};

/// The supported integration kernels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Neighbour-averaging relaxation.
    #[default]
    Pbd,
    /// Distance-constraint relaxation along grid edges.
    MassSpring,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::Pbd, StrategyKind::MassSpring];

    /// Identifier used by the strategy selector.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Pbd => "pbd",
            StrategyKind::MassSpring => "massSpring",
        }
    }

    /// Whether frames run extra constraint sweeps after integration.
    pub fn relaxes_constraints(&self) -> bool {
        matches!(self, StrategyKind::MassSpring)
    }

    /// The next strategy in selector order, wrapping around.
    pub fn next(&self) -> Self {
        match self {
            StrategyKind::Pbd => StrategyKind::MassSpring,
            StrategyKind::MassSpring => StrategyKind::Pbd,
        }
    }

    /// Built-in kernel source for this strategy.
    pub fn default_source(&self, neighborhood: Neighborhood) -> String {
        match self {
            StrategyKind::Pbd => shader::pbd_kernel(),
            StrategyKind::MassSpring => shader::mass_spring_kernel(neighborhood),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised strategy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(pub String);

impl fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown strategy '{}', expected 'pbd' or 'massSpring'", self.0)
    }
}

impl std::error::Error for UnknownStrategy {}

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pbd" => Ok(StrategyKind::Pbd),
            "massSpring" => Ok(StrategyKind::MassSpring),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Lifecycle state of a [`Strategy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyState {
    Unbound,
    Bound,
    Compiled,
}

/// Compute pipelines built from one strategy's kernel.
pub struct CompiledStrategy {
    pub integrate: wgpu::ComputePipeline,
    /// Present for strategies that relax constraints.
    pub constrain: Option<wgpu::ComputePipeline>,
}

/// A kernel and, once compiled, its pipelines.
pub struct Strategy {
    kind: StrategyKind,
    source: Option<String>,
    compiled: Option<CompiledStrategy>,
}

impl Strategy {
    /// A strategy with no kernel bound yet.
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            source: None,
            compiled: None,
        }
    }

    /// A strategy bound to its built-in kernel.
    pub fn builtin(kind: StrategyKind, neighborhood: Neighborhood) -> Self {
        let mut strategy = Self::new(kind);
        strategy.bind(kind.default_source(neighborhood));
        strategy
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn state(&self) -> StrategyState {
        match (&self.source, &self.compiled) {
            (_, Some(_)) => StrategyState::Compiled,
            (Some(_), None) => StrategyState::Bound,
            (None, None) => StrategyState::Unbound,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Bind kernel text. Drops any pipeline compiled from earlier text.
    pub fn bind(&mut self, source: impl Into<String>) {
        self.source = Some(source.into());
        self.compiled = None;
    }

    pub fn compiled(&self) -> Option<&CompiledStrategy> {
        self.compiled.as_ref()
    }

    /// Compile the bound kernel into compute pipelines using `layout`.
    ///
    /// Already-compiled strategies return their cached pipelines. Compilation
    /// and validation errors are captured with an error scope and returned as
    /// [`GpuError::ShaderCompilation`]; there is no fallback kernel.
    pub fn create_pipeline(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
    ) -> Result<&CompiledStrategy, GpuError> {
        if self.compiled.is_none() {
            let source = self.source.as_deref().ok_or(GpuError::Unbound(self.kind))?;
            let compiled = compile(device, layout, self.kind, source)?;
            self.compiled = Some(compiled);
        }
        self.compiled.as_ref().ok_or(GpuError::Unbound(self.kind))
    }
}

fn compile(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    kind: StrategyKind,
    source: &str,
) -> Result<CompiledStrategy, GpuError> {
    let label = format!("{} Compute Shader", kind);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Cloth Compute Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    let make = |entry: &str| {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{} {} Pipeline", kind, entry)),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry),
            compilation_options: Default::default(),
            cache: None,
        })
    };

    let integrate = make(INTEGRATE_ENTRY);
    let constrain = kind.relaxes_constraints().then(|| make(CONSTRAIN_ENTRY));

    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(GpuError::ShaderCompilation {
            label,
            message: err.to_string(),
        });
    }

    log::info!("compiled '{}' strategy", kind);
    Ok(CompiledStrategy { integrate, constrain })
}
