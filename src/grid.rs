//! Rest topology of the cloth.
//!
//! A cloth is an `n × n` grid of particles stored row-major
//! (`idx = row * n + col`). Row 0 is the top edge of the hanging cloth:
//!
//! ```text
//! x = (col - n/2) * spacing
//! y = (n/2 - row) * spacing
//! z = 0
//! ```
//!
//! The grid also owns the neighbour links used as distance constraints and
//! the index lists the renderer draws with. Both are built once; changing the
//! resolution means building a new grid.

use std::collections::HashSet;

use glam::{Vec3, Vec4};

use crate::error::GridError;
use crate::layout::ParticleGpu;
use crate::shader::WORKGROUP_SIZE;

/// Most particles one compute sweep can cover: the WebGPU default
/// `max_compute_workgroups_per_dimension` times the workgroup size.
pub const MAX_PARTICLES: u32 = 65_535 * WORKGROUP_SIZE;

/// Which particles are anchored in place.
///
/// This has a large effect on behaviour (an unpinned cloth simply falls), so
/// it is always chosen explicitly. The default pins the two top corners.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PinPolicy {
    /// Pin `(row 0, col 0)` and `(row 0, col n-1)`.
    #[default]
    TopCorners,
    /// Pin all four corners.
    FourCorners,
    /// Pin every particle in row 0.
    TopEdge,
    /// Nothing is pinned.
    None,
    /// Pin exactly these linear indices.
    Indices(Vec<u32>),
}

impl PinPolicy {
    /// Whether the particle at `(row, col)` is pinned in an `n × n` grid.
    pub fn is_pinned(&self, row: u32, col: u32, n: u32) -> bool {
        let last = n.saturating_sub(1);
        match self {
            PinPolicy::TopCorners => row == 0 && (col == 0 || col == last),
            PinPolicy::FourCorners => (row == 0 || row == last) && (col == 0 || col == last),
            PinPolicy::TopEdge => row == 0,
            PinPolicy::None => false,
            PinPolicy::Indices(indices) => indices.contains(&(row * n + col)),
        }
    }
}

/// Which grid neighbours are linked by distance constraints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Neighborhood {
    /// Right and down neighbours only (4-neighbourhood).
    Structural,
    /// Structural links plus both diagonals for shear stiffness.
    #[default]
    Shear,
}

impl Neighborhood {
    /// Offsets `(d_col, d_row)` of every linked neighbour of a particle.
    pub fn offsets(&self) -> &'static [(i32, i32)] {
        const STRUCTURAL: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
        const SHEAR: [(i32, i32); 8] = [
            (1, 0),
            (-1, 0),
            (0, 1),
            (0, -1),
            (1, 1),
            (-1, -1),
            (1, -1),
            (-1, 1),
        ];
        match self {
            Neighborhood::Structural => &STRUCTURAL,
            Neighborhood::Shear => &SHEAR,
        }
    }

    pub fn includes_shear(&self) -> bool {
        matches!(self, Neighborhood::Shear)
    }
}

/// An undirected link between two particles, stored with `a < b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub a: u32,
    pub b: u32,
}

impl Edge {
    /// Normalised edge, or `None` for a self-link.
    pub fn new(i: u32, j: u32) -> Option<Self> {
        match i.cmp(&j) {
            std::cmp::Ordering::Less => Some(Edge { a: i, b: j }),
            std::cmp::Ordering::Greater => Some(Edge { a: j, b: i }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// A distance constraint: keep `a` and `b` `rest` apart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceConstraint {
    pub a: u32,
    pub b: u32,
    pub rest: f32,
}

/// The cloth's rest pose, pins and links.
#[derive(Clone, Debug)]
pub struct ClothGrid {
    size: u32,
    spacing: f32,
    neighborhood: Neighborhood,
    particles: Vec<ParticleGpu>,
    edges: Vec<Edge>,
}

/// Build an `n × n` cloth grid.
///
/// Fails fast for `n < 2`, for grids above [`MAX_PARTICLES`], for
/// non-positive spacing and for explicit pins that fall outside the grid.
/// Nothing is allocated before these checks pass.
pub fn build_grid(
    n: u32,
    spacing: f32,
    pins: &PinPolicy,
    neighborhood: Neighborhood,
) -> Result<ClothGrid, GridError> {
    if n < 2 {
        return Err(GridError::TooSmall(n));
    }
    let count = particle_count(n)?;
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(GridError::InvalidSpacing(spacing));
    }
    if let PinPolicy::Indices(indices) = pins {
        if let Some(&index) = indices.iter().find(|&&i| i >= count) {
            return Err(GridError::PinOutOfRange { index, count });
        }
    }

    let mut particles = Vec::with_capacity(count as usize);
    for row in 0..n {
        for col in 0..n {
            particles.push(ParticleGpu::new(
                rest_position(n, spacing, row, col),
                pins.is_pinned(row, col, n),
            ));
        }
    }

    let edges = build_edges(n, neighborhood);
    log::debug!(
        "built {}x{} cloth grid: {} edges, {} pinned",
        n,
        n,
        edges.len(),
        particles.iter().filter(|p| p.is_pinned()).count()
    );

    Ok(ClothGrid {
        size: n,
        spacing,
        neighborhood,
        particles,
        edges,
    })
}

/// Number of particles in an `n × n` grid, or `TooLarge` if that overflows
/// or exceeds [`MAX_PARTICLES`].
pub fn particle_count(n: u32) -> Result<u32, GridError> {
    n.checked_mul(n)
        .filter(|&count| count <= MAX_PARTICLES)
        .ok_or(GridError::TooLarge { n, max_particles: MAX_PARTICLES })
}

/// Rest position of `(row, col)` in an `n × n` grid.
pub fn rest_position(n: u32, spacing: f32, row: u32, col: u32) -> Vec3 {
    let half = n as f32 * 0.5;
    Vec3::new(
        (col as f32 - half) * spacing,
        (half - row as f32) * spacing,
        0.0,
    )
}

fn build_edges(n: u32, neighborhood: Neighborhood) -> Vec<Edge> {
    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    let mut link = |i: u32, j: u32| {
        if let Some(edge) = Edge::new(i, j) {
            if seen.insert(edge) {
                edges.push(edge);
            }
        }
    };

    for row in 0..n {
        for col in 0..n {
            let idx = row * n + col;
            if col + 1 < n {
                link(idx, idx + 1);
            }
            if row + 1 < n {
                link(idx, idx + n);
            }
            if neighborhood.includes_shear() && row + 1 < n {
                if col + 1 < n {
                    link(idx, idx + n + 1);
                }
                if col > 0 {
                    link(idx, idx + n - 1);
                }
            }
        }
    }
    edges
}

impl ClothGrid {
    /// Particles per side.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn neighborhood(&self) -> Neighborhood {
        self.neighborhood
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Initial buffer contents, one entry per particle.
    pub fn particles(&self) -> &[ParticleGpu] {
        &self.particles
    }

    pub fn positions(&self) -> Vec<Vec4> {
        self.particles.iter().map(|&p| p.into()).collect()
    }

    pub fn is_pinned(&self, idx: u32) -> bool {
        self.particles
            .get(idx as usize)
            .map_or(false, |p| p.is_pinned())
    }

    pub fn pinned_indices(&self) -> Vec<u32> {
        (0..self.particles.len() as u32)
            .filter(|&i| self.is_pinned(i))
            .collect()
    }

    /// Mark an extra particle as pinned, e.g. a driven vertex.
    pub fn pin(&mut self, idx: u32) -> Result<(), GridError> {
        let count = self.particles.len() as u32;
        let particle = self
            .particles
            .get_mut(idx as usize)
            .ok_or(GridError::PinOutOfRange { index: idx, count })?;
        particle.pinned = 1.0;
        Ok(())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Rest position of particle `idx`.
    pub fn rest_position(&self, idx: u32) -> Vec3 {
        rest_position(self.size, self.spacing, idx / self.size, idx % self.size)
    }

    /// Edges as distance constraints with rest lengths from the rest pose.
    pub fn constraints(&self) -> Vec<DistanceConstraint> {
        self.edges
            .iter()
            .map(|e| DistanceConstraint {
                a: e.a,
                b: e.b,
                rest: self.rest_position(e.a).distance(self.rest_position(e.b)),
            })
            .collect()
    }

    /// Two counter-clockwise triangles per grid cell.
    pub fn triangle_indices(&self) -> Vec<u32> {
        let n = self.size;
        let mut indices = Vec::with_capacity(((n - 1) * (n - 1) * 6) as usize);
        for row in 0..n - 1 {
            for col in 0..n - 1 {
                let i = row * n + col;
                indices.extend_from_slice(&[i, i + n, i + 1, i + 1, i + n, i + n + 1]);
            }
        }
        indices
    }

    /// The edge list flattened into line-list index pairs.
    pub fn line_indices(&self) -> Vec<u32> {
        self.edges.iter().flat_map(|e| [e.a, e.b]).collect()
    }
}
