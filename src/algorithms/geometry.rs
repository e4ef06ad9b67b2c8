//! Anchor layout derivation
//!
//! Anchor coordinates are established once at startup, either from a literal
//! coordinate table or from the three pairwise distances between exactly three
//! anchors. In the second mode anchor A sits at the origin, B on the positive
//! x axis and C above it:
//!
//! ```text
//! x_C = (d_ab² + d_ac² - d_bc²) / (2·d_ab)
//! y_C = sqrt(d_ac² - x_C²)
//! ```

use crate::core::{AnchorId, AnchorPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while establishing anchor coordinates. All of them are fatal
/// at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("triangle inequality violated: d_ab={d_ab}, d_ac={d_ac}, d_bc={d_bc}")]
    TriangleInequality { d_ab: f64, d_ac: f64, d_bc: f64 },

    #[error("anchors are collinear: d_ab={d_ab}, d_ac={d_ac}, d_bc={d_bc}")]
    DegenerateTriangle { d_ab: f64, d_ac: f64, d_bc: f64 },

    #[error("distance {name} must be positive and finite, got {value}")]
    InvalidDistance { name: &'static str, value: f64 },

    #[error("triangle layout needs exactly 3 anchors, got {found}")]
    AnchorCount { found: usize },

    #[error("no coordinate given for anchor {0}")]
    MissingCoordinate(AnchorId),

    #[error("coordinate given for unconfigured anchor {0}")]
    UnknownAnchor(AnchorId),

    #[error("anchor {0} listed more than once")]
    DuplicateAnchor(AnchorId),

    #[error("coordinate for anchor {0} is not finite")]
    NonFiniteCoordinate(AnchorId),
}

/// Literal coordinate entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralAnchor {
    pub id: AnchorId,
    pub x: f64,
    pub y: f64,
}

/// How anchor coordinates are obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LayoutMode {
    /// Explicit coordinates for any number of anchors
    Literal { coordinates: Vec<LiteralAnchor> },
    /// Three anchors placed from their pairwise distances
    TriangleFromDistances { d_ab: f64, d_ac: f64, d_bc: f64 },
}

/// Places anchors in the shared frame
pub struct GeometrySolver;

impl GeometrySolver {
    /// Place A at the origin, B at (d_ab, 0) and C in the upper half-plane.
    pub fn triangle_from_distances(
        d_ab: f64,
        d_ac: f64,
        d_bc: f64,
    ) -> Result<[AnchorPosition; 3], GeometryError> {
        for (name, value) in [("d_ab", d_ab), ("d_ac", d_ac), ("d_bc", d_bc)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GeometryError::InvalidDistance { name, value });
            }
        }

        let x_c = (d_ab.powi(2) + d_ac.powi(2) - d_bc.powi(2)) / (2.0 * d_ab);
        let y_c_squared = d_ac.powi(2) - x_c.powi(2);

        if y_c_squared < 0.0 {
            return Err(GeometryError::TriangleInequality { d_ab, d_ac, d_bc });
        }

        let y_c = y_c_squared.sqrt();

        // A flat triangle puts all three anchors on one line; every later solve
        // against it would be rank deficient.
        let scale = d_ab.max(d_ac).max(d_bc);
        if y_c <= scale * 1e-9 {
            return Err(GeometryError::DegenerateTriangle { d_ab, d_ac, d_bc });
        }

        Ok([
            AnchorPosition::origin(),
            AnchorPosition::new(d_ab, 0.0),
            AnchorPosition::new(x_c, y_c),
        ])
    }
}

/// Immutable, ordered mapping from anchor id to position
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorLayout {
    anchors: Vec<(AnchorId, AnchorPosition)>,
    index: HashMap<AnchorId, usize>,
}

impl AnchorLayout {
    /// Build a layout from explicit coordinates, preserving their order
    pub fn literal<I>(anchors: I) -> Result<Self, GeometryError>
    where
        I: IntoIterator<Item = (AnchorId, AnchorPosition)>,
    {
        let mut layout = AnchorLayout {
            anchors: Vec::new(),
            index: HashMap::new(),
        };

        for (id, position) in anchors {
            if !position.is_finite() {
                return Err(GeometryError::NonFiniteCoordinate(id));
            }
            if layout.index.contains_key(&id) {
                return Err(GeometryError::DuplicateAnchor(id));
            }
            layout.index.insert(id.clone(), layout.anchors.len());
            layout.anchors.push((id, position));
        }

        Ok(layout)
    }

    /// Build the layout for the configured anchor ids using the given mode.
    ///
    /// The resulting order always follows `ids`.
    pub fn from_mode(ids: &[AnchorId], mode: &LayoutMode) -> Result<Self, GeometryError> {
        match mode {
            LayoutMode::Literal { coordinates } => {
                let mut table: HashMap<&AnchorId, AnchorPosition> = HashMap::new();
                for entry in coordinates {
                    if !ids.contains(&entry.id) {
                        return Err(GeometryError::UnknownAnchor(entry.id.clone()));
                    }
                    if table
                        .insert(&entry.id, AnchorPosition::new(entry.x, entry.y))
                        .is_some()
                    {
                        return Err(GeometryError::DuplicateAnchor(entry.id.clone()));
                    }
                }

                let mut ordered = Vec::with_capacity(ids.len());
                for id in ids {
                    let position = table
                        .get(id)
                        .copied()
                        .ok_or_else(|| GeometryError::MissingCoordinate(id.clone()))?;
                    ordered.push((id.clone(), position));
                }

                Self::literal(ordered)
            }
            LayoutMode::TriangleFromDistances { d_ab, d_ac, d_bc } => {
                if ids.len() != 3 {
                    return Err(GeometryError::AnchorCount { found: ids.len() });
                }
                let positions = GeometrySolver::triangle_from_distances(*d_ab, *d_ac, *d_bc)?;
                Self::literal(ids.iter().cloned().zip(positions))
            }
        }
    }

    pub fn position(&self, id: &AnchorId) -> Option<AnchorPosition> {
        self.index.get(id).map(|&i| self.anchors[i].1)
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.index.contains_key(id)
    }

    /// Anchor ids in configured order
    pub fn ids(&self) -> impl Iterator<Item = &AnchorId> {
        self.anchors.iter().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnchorId, &AnchorPosition)> {
        self.anchors.iter().map(|(id, pos)| (id, pos))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
