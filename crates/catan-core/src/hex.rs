//! Hex-grid coordinate system: cube hex coordinates, pole-form vertices and
//! canonical edges.
//!
//! The board is a pointy-top hex grid addressed by cube coordinates `(q, r, s)`
//! with `q + r + s = 0`. Intersections (where settlements go) are named by a
//! hex and one of its two poles (`N`/`S`); sides (where roads go) are named by
//! a hex and one of the three canonical directions `NE`/`E`/`SE` — the other
//! three directions of a hex are the canonical edges of its neighbors. All
//! public constructors canonicalize, so two values naming the same geometric
//! feature always compare equal.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Radius of the playable region: 19 hexes (center plus two rings).
pub const BOARD_RADIUS: i32 = 2;

/// One of the six neighbor directions of a hex.
///
/// Used for grid steps and accepted on the wire for edges; canonical edge
/// coordinates only ever carry [`EdgeDir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wind {
    NE,
    E,
    SE,
    SW,
    W,
    NW,
}

impl Wind {
    /// All directions, clockwise from NE.
    pub const ALL: [Wind; 6] = [Wind::NE, Wind::E, Wind::SE, Wind::SW, Wind::W, Wind::NW];

    /// The direction pointing the opposite way.
    pub fn opposite(self) -> Wind {
        match self {
            Wind::NE => Wind::SW,
            Wind::E => Wind::W,
            Wind::SE => Wind::NW,
            Wind::SW => Wind::NE,
            Wind::W => Wind::E,
            Wind::NW => Wind::SE,
        }
    }
}

/// The three canonical edge directions. An edge named with `SW`/`W`/`NW` is
/// rewritten to the `NE`/`E`/`SE` edge of the neighboring hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeDir {
    NE,
    E,
    SE,
}

impl EdgeDir {
    pub const ALL: [EdgeDir; 3] = [EdgeDir::NE, EdgeDir::E, EdgeDir::SE];

    fn wind(self) -> Wind {
        match self {
            EdgeDir::NE => Wind::NE,
            EdgeDir::E => Wind::E,
            EdgeDir::SE => Wind::SE,
        }
    }
}

/// Vertex pole: the top (`N`) or bottom (`S`) corner of a hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexDir {
    N,
    S,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid coordinate key: {0}")]
pub struct ParseCoordError(String);

/// Cube coordinate of a hex. Invariant: `q + r + s = 0`, checked when
/// deserializing wire input.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "RawHex")]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
    pub s: i32,
}

#[derive(Deserialize)]
struct RawHex {
    q: i32,
    r: i32,
    s: i32,
}

impl TryFrom<RawHex> for HexCoord {
    type Error = String;

    fn try_from(raw: RawHex) -> Result<Self, Self::Error> {
        if raw.q + raw.r + raw.s != 0 {
            return Err(format!(
                "hex coordinate ({},{},{}) must satisfy q + r + s = 0",
                raw.q, raw.r, raw.s
            ));
        }
        Ok(HexCoord::new(raw.q, raw.r))
    }
}

impl HexCoord {
    /// Build from axial `(q, r)`; `s` is derived.
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r, s: -q - r }
    }

    /// The neighboring hex one step in the given direction.
    pub fn neighbor(self, wind: Wind) -> HexCoord {
        match wind {
            Wind::E => HexCoord::new(self.q + 1, self.r),
            Wind::NE => HexCoord::new(self.q + 1, self.r - 1),
            Wind::NW => HexCoord::new(self.q, self.r - 1),
            Wind::W => HexCoord::new(self.q - 1, self.r),
            Wind::SW => HexCoord::new(self.q - 1, self.r + 1),
            Wind::SE => HexCoord::new(self.q, self.r + 1),
        }
    }

    /// All six neighbors, clockwise from NE.
    pub fn neighbors(self) -> [HexCoord; 6] {
        Wind::ALL.map(|w| self.neighbor(w))
    }

    /// Grid distance in hex steps.
    pub fn distance_to(self, other: HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s - other.s).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// The board hexes in enumeration order: center, then each ring walked in
    /// a fixed direction sequence. Deterministic; the board generator assigns
    /// tiles against this order.
    pub fn spiral(radius: i32) -> Vec<HexCoord> {
        let mut out = vec![HexCoord::new(0, 0)];
        for ring in 1..=radius {
            let mut cursor = HexCoord::new(ring, 0);
            for wind in [Wind::NW, Wind::W, Wind::SW, Wind::SE, Wind::E, Wind::NE] {
                for _ in 0..ring {
                    out.push(cursor);
                    cursor = cursor.neighbor(wind);
                }
            }
        }
        out
    }

    /// The six corners of this hex, each in canonical pole form.
    pub fn vertices(self) -> [VertexCoord; 6] {
        [
            VertexCoord::new(self, VertexDir::N),
            VertexCoord::new(self.neighbor(Wind::NE), VertexDir::S),
            VertexCoord::new(self.neighbor(Wind::SE), VertexDir::N),
            VertexCoord::new(self, VertexDir::S),
            VertexCoord::new(self.neighbor(Wind::SW), VertexDir::N),
            VertexCoord::new(self.neighbor(Wind::NW), VertexDir::S),
        ]
    }

    /// The six sides of this hex, each in canonical form.
    pub fn edges(self) -> [EdgeCoord; 6] {
        Wind::ALL.map(|w| EdgeCoord::new(self, w))
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.q, self.r, self.s)
    }
}

impl FromStr for HexCoord {
    type Err = ParseCoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        let err = || ParseCoordError(s.to_string());
        if parts.len() != 3 {
            return Err(err());
        }
        let q: i32 = parts[0].parse().map_err(|_| err())?;
        let r: i32 = parts[1].parse().map_err(|_| err())?;
        let cs: i32 = parts[2].parse().map_err(|_| err())?;
        if q + r + cs != 0 {
            return Err(err());
        }
        Ok(HexCoord::new(q, r))
    }
}

/// An intersection, identified by a hex and one of its poles.
///
/// Every intersection of the grid is the `N` or `S` pole of exactly one hex,
/// so the pole form is already unique; [`VertexCoord::canonical`] resolves
/// the equivalence class across the touching hexes and lands back on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawVertex", into = "RawVertex")]
pub struct VertexCoord {
    pub hex: HexCoord,
    pub dir: VertexDir,
}

#[derive(Serialize, Deserialize)]
struct RawVertex {
    q: i32,
    r: i32,
    s: i32,
    dir: VertexDir,
}

impl TryFrom<RawVertex> for VertexCoord {
    type Error = String;

    fn try_from(raw: RawVertex) -> Result<Self, Self::Error> {
        if raw.q + raw.r + raw.s != 0 {
            return Err(format!(
                "vertex hex ({},{},{}) must satisfy q + r + s = 0",
                raw.q, raw.r, raw.s
            ));
        }
        Ok(VertexCoord::new(HexCoord::new(raw.q, raw.r), raw.dir))
    }
}

impl From<VertexCoord> for RawVertex {
    fn from(v: VertexCoord) -> Self {
        RawVertex {
            q: v.hex.q,
            r: v.hex.r,
            s: v.hex.s,
            dir: v.dir,
        }
    }
}

impl VertexCoord {
    /// Create a vertex coordinate, canonicalized.
    pub fn new(hex: HexCoord, dir: VertexDir) -> Self {
        Self { hex, dir }.canonical()
    }

    /// Position on the doubled vertex lattice: poles of hex `(q, r)` sit at
    /// `(2q + r, 3r ∓ 2)`. Two vertex names denote the same intersection
    /// exactly when their lattice positions coincide.
    fn lattice(self) -> (i32, i32) {
        let x = 2 * self.hex.q + self.hex.r;
        let y = match self.dir {
            VertexDir::N => 3 * self.hex.r - 2,
            VertexDir::S => 3 * self.hex.r + 2,
        };
        (x, y)
    }

    /// Resolve to the canonical representative: collect every `(hex, pole)`
    /// name for this intersection across the hexes that touch it and pick the
    /// lexicographically smallest `(q, r, s, dir)` tuple. Idempotent and
    /// independent of enumeration order.
    pub fn canonical(self) -> Self {
        let here = self.lattice();
        let mut candidates: Vec<VertexCoord> = Vec::new();
        for hex in self.touching_hexes() {
            for dir in [VertexDir::N, VertexDir::S] {
                let candidate = VertexCoord { hex, dir };
                if candidate.lattice() == here {
                    candidates.push(candidate);
                }
            }
        }
        candidates.sort_by_key(|v| (v.hex.q, v.hex.r, v.hex.s, v.dir));
        candidates.into_iter().next().unwrap_or(self)
    }

    /// The three hexes meeting at this intersection.
    pub fn touching_hexes(self) -> [HexCoord; 3] {
        match self.dir {
            VertexDir::N => [
                self.hex,
                self.hex.neighbor(Wind::NW),
                self.hex.neighbor(Wind::NE),
            ],
            VertexDir::S => [
                self.hex,
                self.hex.neighbor(Wind::SW),
                self.hex.neighbor(Wind::SE),
            ],
        }
    }

    /// The three edges meeting at this intersection, canonical.
    pub fn touching_edges(self) -> [EdgeCoord; 3] {
        match self.dir {
            VertexDir::N => [
                EdgeCoord::new(self.hex, Wind::NE),
                EdgeCoord::new(self.hex, Wind::NW),
                EdgeCoord::new(self.hex.neighbor(Wind::NW), Wind::E),
            ],
            VertexDir::S => [
                EdgeCoord::new(self.hex, Wind::SE),
                EdgeCoord::new(self.hex, Wind::SW),
                EdgeCoord::new(self.hex.neighbor(Wind::SW), Wind::E),
            ],
        }
    }

    /// The intersections one edge away.
    pub fn adjacent_vertices(self) -> [VertexCoord; 3] {
        self.touching_edges().map(|edge| {
            let [a, b] = edge.endpoints();
            if a == self {
                b
            } else {
                a
            }
        })
    }
}

impl fmt::Display for VertexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.dir {
            VertexDir::N => "N",
            VertexDir::S => "S",
        };
        write!(f, "{},{}", self.hex, dir)
    }
}

impl FromStr for VertexCoord {
    type Err = ParseCoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCoordError(s.to_string());
        let (hex_part, dir_part) = s.rsplit_once(',').ok_or_else(err)?;
        let hex: HexCoord = hex_part.parse()?;
        let dir = match dir_part {
            "N" => VertexDir::N,
            "S" => VertexDir::S,
            _ => return Err(err()),
        };
        Ok(VertexCoord::new(hex, dir))
    }
}

/// A side of a hex, identified by a hex and a canonical direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawEdge", into = "RawEdge")]
pub struct EdgeCoord {
    pub hex: HexCoord,
    pub dir: EdgeDir,
}

#[derive(Serialize, Deserialize)]
struct RawEdge {
    q: i32,
    r: i32,
    s: i32,
    dir: Wind,
}

impl TryFrom<RawEdge> for EdgeCoord {
    type Error = String;

    fn try_from(raw: RawEdge) -> Result<Self, Self::Error> {
        if raw.q + raw.r + raw.s != 0 {
            return Err(format!(
                "edge hex ({},{},{}) must satisfy q + r + s = 0",
                raw.q, raw.r, raw.s
            ));
        }
        Ok(EdgeCoord::new(HexCoord::new(raw.q, raw.r), raw.dir))
    }
}

impl From<EdgeCoord> for RawEdge {
    fn from(e: EdgeCoord) -> Self {
        RawEdge {
            q: e.hex.q,
            r: e.hex.r,
            s: e.hex.s,
            dir: e.dir.wind(),
        }
    }
}

impl EdgeCoord {
    /// Create an edge coordinate from any of the six directions; `SW`/`W`/`NW`
    /// are rewritten to the canonical direction of the neighboring hex.
    pub fn new(hex: HexCoord, wind: Wind) -> Self {
        match wind {
            Wind::NE => Self { hex, dir: EdgeDir::NE },
            Wind::E => Self { hex, dir: EdgeDir::E },
            Wind::SE => Self { hex, dir: EdgeDir::SE },
            Wind::SW | Wind::W | Wind::NW => {
                let dir = match wind.opposite() {
                    Wind::NE => EdgeDir::NE,
                    Wind::E => EdgeDir::E,
                    _ => EdgeDir::SE,
                };
                Self {
                    hex: hex.neighbor(wind),
                    dir,
                }
            }
        }
    }

    /// The two hexes sharing this edge.
    pub fn touching_hexes(self) -> [HexCoord; 2] {
        [self.hex, self.hex.neighbor(self.dir.wind())]
    }

    /// The two intersections at the ends of this edge.
    pub fn endpoints(self) -> [VertexCoord; 2] {
        match self.dir {
            EdgeDir::NE => [
                VertexCoord::new(self.hex, VertexDir::N),
                VertexCoord::new(self.hex.neighbor(Wind::NE), VertexDir::S),
            ],
            EdgeDir::E => [
                VertexCoord::new(self.hex.neighbor(Wind::NE), VertexDir::S),
                VertexCoord::new(self.hex.neighbor(Wind::SE), VertexDir::N),
            ],
            EdgeDir::SE => [
                VertexCoord::new(self.hex.neighbor(Wind::SE), VertexDir::N),
                VertexCoord::new(self.hex, VertexDir::S),
            ],
        }
    }
}

impl fmt::Display for EdgeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.dir {
            EdgeDir::NE => "NE",
            EdgeDir::E => "E",
            EdgeDir::SE => "SE",
        };
        write!(f, "{},{}", self.hex, dir)
    }
}

impl FromStr for EdgeCoord {
    type Err = ParseCoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCoordError(s.to_string());
        let (hex_part, dir_part) = s.rsplit_once(',').ok_or_else(err)?;
        let hex: HexCoord = hex_part.parse()?;
        let wind = match dir_part {
            "NE" => Wind::NE,
            "E" => Wind::E,
            "SE" => Wind::SE,
            "SW" => Wind::SW,
            "W" => Wind::W,
            "NW" => Wind::NW,
            _ => return Err(err()),
        };
        Ok(EdgeCoord::new(hex, wind))
    }
}

/// Precomputed adjacency tables for the fixed board shape.
///
/// Built once per process and shared read-only across rooms; a function of
/// the grid shape, never of any game's state.
pub struct Geometry {
    /// The 19 land hexes in enumeration order.
    pub hexes: Vec<HexCoord>,
    pub hex_set: HashSet<HexCoord>,
    /// The 54 board intersections, sorted.
    pub vertices: Vec<VertexCoord>,
    pub vertex_set: HashSet<VertexCoord>,
    /// The 72 board edges, sorted.
    pub edges: Vec<EdgeCoord>,
    pub edge_set: HashSet<EdgeCoord>,
    /// Vertex -> the 1-3 land hexes it touches.
    pub vertex_hexes: HashMap<VertexCoord, Vec<HexCoord>>,
    /// Vertex -> the 2-3 board edges it touches.
    pub vertex_edges: HashMap<VertexCoord, Vec<EdgeCoord>>,
    /// Vertex -> the 2-3 board vertices one edge away.
    pub vertex_vertices: HashMap<VertexCoord, Vec<VertexCoord>>,
    /// Hex -> its 6 corner vertices.
    pub hex_vertices: HashMap<HexCoord, [VertexCoord; 6]>,
    /// Hex -> its 6 edges.
    pub hex_edges: HashMap<HexCoord, [EdgeCoord; 6]>,
    /// Edge -> its 2 endpoint vertices.
    pub edge_vertices: HashMap<EdgeCoord, [VertexCoord; 2]>,
}

impl Geometry {
    fn build() -> Self {
        let hexes = HexCoord::spiral(BOARD_RADIUS);
        let hex_set: HashSet<HexCoord> = hexes.iter().copied().collect();

        let mut vertex_set = HashSet::new();
        let mut edge_set = HashSet::new();
        let mut hex_vertices = HashMap::new();
        let mut hex_edges = HashMap::new();
        for &hex in &hexes {
            let corners = hex.vertices();
            let sides = hex.edges();
            vertex_set.extend(corners);
            edge_set.extend(sides);
            hex_vertices.insert(hex, corners);
            hex_edges.insert(hex, sides);
        }

        let mut vertices: Vec<VertexCoord> = vertex_set.iter().copied().collect();
        vertices.sort();
        let mut edges: Vec<EdgeCoord> = edge_set.iter().copied().collect();
        edges.sort();

        let mut vertex_hexes = HashMap::new();
        let mut vertex_edges = HashMap::new();
        let mut vertex_vertices = HashMap::new();
        for &vertex in &vertices {
            vertex_hexes.insert(
                vertex,
                vertex
                    .touching_hexes()
                    .into_iter()
                    .filter(|h| hex_set.contains(h))
                    .collect::<Vec<_>>(),
            );
            vertex_edges.insert(
                vertex,
                vertex
                    .touching_edges()
                    .into_iter()
                    .filter(|e| edge_set.contains(e))
                    .collect::<Vec<_>>(),
            );
            vertex_vertices.insert(
                vertex,
                vertex
                    .adjacent_vertices()
                    .into_iter()
                    .filter(|v| vertex_set.contains(v))
                    .collect::<Vec<_>>(),
            );
        }

        let mut edge_vertices = HashMap::new();
        for &edge in &edges {
            edge_vertices.insert(edge, edge.endpoints());
        }

        Self {
            hexes,
            hex_set,
            vertices,
            vertex_set,
            edges,
            edge_set,
            vertex_hexes,
            vertex_edges,
            vertex_vertices,
            hex_vertices,
            hex_edges,
            edge_vertices,
        }
    }
}

/// The shared geometry tables for the standard board.
pub fn geometry() -> &'static Geometry {
    static TABLES: once_cell::sync::Lazy<Geometry> = once_cell::sync::Lazy::new(Geometry::build);
    &TABLES
}
