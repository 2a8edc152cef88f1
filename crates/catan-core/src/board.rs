//! Board state: terrain tiles, number tokens, buildings, roads, ports and the
//! robber, plus seeded board generation.
//!
//! The board owns placement queries (distance rule, road connectivity with
//! enemy blocking, production claims, longest-road search) but performs no
//! rule validation itself; the game reducer validates before mutating.

use crate::hex::{geometry, EdgeCoord, HexCoord, VertexCoord, Wind};
use crate::player::Resource;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Seat index of a player (0-3).
pub type PlayerId = u8;

/// Resample attempts for the 6/8 adjacency constraint before switching to
/// token-swap repair.
const TOKEN_RESAMPLE_ATTEMPTS: u32 = 1000;
/// Repair passes after resampling is exhausted. The swap walk converges long
/// before this in practice; the bound keeps generation total.
const TOKEN_REPAIR_PASSES: u32 = 100;

/// Terrain of a land hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Forest,
    Pasture,
    Fields,
    Hills,
    Mountains,
    Desert,
}

impl Terrain {
    /// The resource this terrain produces, if any.
    pub fn resource(self) -> Option<Resource> {
        match self {
            Terrain::Forest => Some(Resource::Wood),
            Terrain::Pasture => Some(Resource::Sheep),
            Terrain::Fields => Some(Resource::Wheat),
            Terrain::Hills => Some(Resource::Brick),
            Terrain::Mountains => Some(Resource::Ore),
            Terrain::Desert => None,
        }
    }
}

/// The 19 terrain tiles of the standard layout.
fn terrain_pool() -> Vec<Terrain> {
    let mut pool = Vec::with_capacity(19);
    pool.extend(std::iter::repeat(Terrain::Forest).take(4));
    pool.extend(std::iter::repeat(Terrain::Pasture).take(4));
    pool.extend(std::iter::repeat(Terrain::Fields).take(4));
    pool.extend(std::iter::repeat(Terrain::Hills).take(3));
    pool.extend(std::iter::repeat(Terrain::Mountains).take(3));
    pool.push(Terrain::Desert);
    pool
}

/// The 18 number tokens of the standard layout.
const NUMBER_TOKENS: [u8; 18] = [2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];

/// A land hex with its terrain and, unless desert, its number token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub coord: HexCoord,
    pub terrain: Terrain,
    pub token: Option<u8>,
}

/// Building kind at a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingKind {
    Settlement,
    City,
}

/// A building at a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub kind: BuildingKind,
    pub owner: PlayerId,
}

impl Building {
    /// Resources produced per matching roll.
    pub fn production_multiplier(self) -> u32 {
        match self.kind {
            BuildingKind::Settlement => 1,
            BuildingKind::City => 2,
        }
    }
}

/// Port type: 3:1 generic or 2:1 for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Generic,
    Wood,
    Brick,
    Sheep,
    Wheat,
    Ore,
}

impl PortKind {
    /// The resource a 2:1 port trades, if any.
    pub fn resource(self) -> Option<Resource> {
        match self {
            PortKind::Generic => None,
            PortKind::Wood => Some(Resource::Wood),
            PortKind::Brick => Some(Resource::Brick),
            PortKind::Sheep => Some(Resource::Sheep),
            PortKind::Wheat => Some(Resource::Wheat),
            PortKind::Ore => Some(Resource::Ore),
        }
    }
}

/// A port on a coastal edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub edge: EdgeCoord,
    pub kind: PortKind,
}

/// The nine coastal edges that carry ports. Positions are fixed; only the
/// port types are shuffled per seed.
const PORT_EDGES: [(HexCoord, Wind); 9] = [
    (HexCoord::new(2, -2), Wind::NE),
    (HexCoord::new(1, -2), Wind::NW),
    (HexCoord::new(-1, -1), Wind::NW),
    (HexCoord::new(-2, 0), Wind::W),
    (HexCoord::new(-2, 2), Wind::SW),
    (HexCoord::new(-1, 2), Wind::SW),
    (HexCoord::new(1, 1), Wind::SE),
    (HexCoord::new(2, 0), Wind::E),
    (HexCoord::new(2, -1), Wind::NE),
];

/// The complete board.
#[derive(Debug, Clone)]
pub struct Board {
    tiles: HashMap<HexCoord, Tile>,
    buildings: HashMap<VertexCoord, Building>,
    roads: HashMap<EdgeCoord, PlayerId>,
    ports: Vec<Port>,
    robber: HexCoord,
}

impl Board {
    /// Generate a board from a seed. Returns the board and the advanced seed
    /// cursor. Generation never fails: the 6/8 constraint is satisfied by
    /// resampling and, failing that, by a token-swap repair walk.
    pub fn generate(seed: u64) -> (Board, u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let geo = geometry();

        let mut terrains = terrain_pool();
        terrains.shuffle(&mut rng);

        let mut assignment = sample_tokens(&terrains, &mut rng);
        repair_tokens(geo, &terrains, &mut assignment, &mut rng);

        let mut tiles = HashMap::with_capacity(19);
        let mut robber = HexCoord::new(0, 0);
        let mut token_iter = assignment.into_iter();
        for (i, &coord) in geo.hexes.iter().enumerate() {
            let terrain = terrains[i];
            let token = if terrain == Terrain::Desert {
                robber = coord;
                None
            } else {
                token_iter.next()
            };
            tiles.insert(
                coord,
                Tile {
                    coord,
                    terrain,
                    token,
                },
            );
        }

        let mut kinds = vec![
            PortKind::Generic,
            PortKind::Generic,
            PortKind::Generic,
            PortKind::Generic,
            PortKind::Wood,
            PortKind::Brick,
            PortKind::Sheep,
            PortKind::Wheat,
            PortKind::Ore,
        ];
        kinds.shuffle(&mut rng);
        let ports = PORT_EDGES
            .iter()
            .zip(kinds)
            .map(|(&(hex, wind), kind)| Port {
                edge: EdgeCoord::new(hex, wind),
                kind,
            })
            .collect();

        let board = Board {
            tiles,
            buildings: HashMap::new(),
            roads: HashMap::new(),
            ports,
            robber,
        };
        (board, rng.gen())
    }

    // ==================== Queries ====================

    pub fn tile(&self, coord: &HexCoord) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn robber(&self) -> HexCoord {
        self.robber
    }

    pub fn building(&self, vertex: &VertexCoord) -> Option<&Building> {
        self.buildings.get(vertex)
    }

    pub fn buildings(&self) -> impl Iterator<Item = (&VertexCoord, &Building)> {
        self.buildings.iter()
    }

    pub fn road_owner(&self, edge: &EdgeCoord) -> Option<PlayerId> {
        self.roads.get(edge).copied()
    }

    pub fn roads(&self) -> impl Iterator<Item = (&EdgeCoord, PlayerId)> {
        self.roads.iter().map(|(e, &p)| (e, p))
    }

    /// Whether the vertex lies on the board.
    pub fn is_board_vertex(&self, vertex: &VertexCoord) -> bool {
        geometry().vertex_set.contains(vertex)
    }

    /// Whether the edge lies on the board.
    pub fn is_board_edge(&self, edge: &EdgeCoord) -> bool {
        geometry().edge_set.contains(edge)
    }

    /// Distance rule: true when no building occupies any adjacent vertex.
    pub fn distance_rule_ok(&self, vertex: &VertexCoord) -> bool {
        geometry().vertex_vertices[vertex]
            .iter()
            .all(|adj| !self.buildings.contains_key(adj))
    }

    /// Whether one of the player's roads touches the vertex.
    pub fn touches_own_road(&self, vertex: &VertexCoord, player: PlayerId) -> bool {
        geometry().vertex_edges[vertex]
            .iter()
            .any(|edge| self.road_owner(edge) == Some(player))
    }

    /// Whether a new road at `edge` connects to the player's network: an own
    /// building at an endpoint, or an own road reaching an endpoint that is
    /// not occupied by an enemy building (enemy buildings block pass-through).
    pub fn road_connects(&self, edge: &EdgeCoord, player: PlayerId) -> bool {
        let geo = geometry();
        for endpoint in geo.edge_vertices[edge] {
            match self.building(&endpoint) {
                Some(b) if b.owner == player => return true,
                Some(_) => continue, // enemy building: no connectivity through here
                None => {}
            }
            if geo.vertex_edges[&endpoint]
                .iter()
                .any(|adj| adj != edge && self.road_owner(adj) == Some(player))
            {
                return true;
            }
        }
        false
    }

    /// Port types reachable from a vertex (endpoints of port edges).
    pub fn ports_at_vertex(&self, vertex: &VertexCoord) -> Vec<PortKind> {
        self.ports
            .iter()
            .filter(|port| port.edge.endpoints().contains(vertex))
            .map(|port| port.kind)
            .collect()
    }

    /// Players owning a building on any corner of the hex, ascending seat
    /// order, excluding nobody.
    pub fn players_on_hex(&self, hex: &HexCoord) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = geometry()
            .hex_vertices
            .get(hex)
            .into_iter()
            .flatten()
            .filter_map(|v| self.building(v).map(|b| b.owner))
            .collect();
        players.sort_unstable();
        players.dedup();
        players
    }

    /// Per-player resource claims for a dice total, before bank scarcity.
    /// Skips the desert and the hex under the robber.
    pub fn production_claims(&self, roll: u8) -> HashMap<PlayerId, HashMap<Resource, u32>> {
        let geo = geometry();
        let mut claims: HashMap<PlayerId, HashMap<Resource, u32>> = HashMap::new();
        for tile in self.tiles.values() {
            if tile.token != Some(roll) || tile.coord == self.robber {
                continue;
            }
            let resource = match tile.terrain.resource() {
                Some(r) => r,
                None => continue,
            };
            for vertex in &geo.hex_vertices[&tile.coord] {
                if let Some(building) = self.building(vertex) {
                    *claims
                        .entry(building.owner)
                        .or_default()
                        .entry(resource)
                        .or_insert(0) += building.production_multiplier();
                }
            }
        }
        claims
    }

    /// Number of settlements the player has on the board.
    pub fn settlement_count(&self, player: PlayerId) -> u32 {
        self.count_buildings(player, BuildingKind::Settlement)
    }

    /// Number of cities the player has on the board.
    pub fn city_count(&self, player: PlayerId) -> u32 {
        self.count_buildings(player, BuildingKind::City)
    }

    fn count_buildings(&self, player: PlayerId, kind: BuildingKind) -> u32 {
        self.buildings
            .values()
            .filter(|b| b.owner == player && b.kind == kind)
            .count() as u32
    }

    // ==================== Mutations ====================

    /// Place a settlement. Validation happens in the reducer.
    pub fn place_settlement(&mut self, vertex: VertexCoord, player: PlayerId) {
        self.buildings.insert(
            vertex,
            Building {
                kind: BuildingKind::Settlement,
                owner: player,
            },
        );
    }

    /// Replace a settlement with a city.
    pub fn upgrade_to_city(&mut self, vertex: VertexCoord, player: PlayerId) {
        self.buildings.insert(
            vertex,
            Building {
                kind: BuildingKind::City,
                owner: player,
            },
        );
    }

    /// Place a road.
    pub fn place_road(&mut self, edge: EdgeCoord, player: PlayerId) {
        self.roads.insert(edge, player);
    }

    /// Move the robber.
    pub fn move_robber(&mut self, hex: HexCoord) {
        self.robber = hex;
    }

    // ==================== Longest road ====================

    /// Length of the player's longest simple edge-path: each road used at
    /// most once, traversal blocked at any vertex owned by another player.
    pub fn longest_road(&self, player: PlayerId) -> u32 {
        let geo = geometry();
        let player_edges: Vec<EdgeCoord> = self
            .roads
            .iter()
            .filter(|(_, &owner)| owner == player)
            .map(|(&edge, _)| edge)
            .collect();

        let mut best = 0;
        for &edge in &player_edges {
            let [a, b] = geo.edge_vertices[&edge];
            for start in [a, b] {
                let far = if start == a { b } else { a };
                let mut visited = std::collections::HashSet::from([edge]);
                best = best.max(1 + self.extend_path(player, far, &mut visited));
            }
        }
        best
    }

    /// Longest continuation from `from` over unvisited roads of the player.
    fn extend_path(
        &self,
        player: PlayerId,
        from: VertexCoord,
        visited: &mut std::collections::HashSet<EdgeCoord>,
    ) -> u32 {
        if self.building(&from).is_some_and(|b| b.owner != player) {
            return 0;
        }
        let geo = geometry();
        let mut best = 0;
        for &next in &geo.vertex_edges[&from] {
            if visited.contains(&next) || self.road_owner(&next) != Some(player) {
                continue;
            }
            visited.insert(next);
            let [a, b] = geo.edge_vertices[&next];
            let far = if from == a { b } else { a };
            best = best.max(1 + self.extend_path(player, far, visited));
            visited.remove(&next);
        }
        best
    }
}

/// Assign tokens to the non-desert hexes, resampling until the 6/8 adjacency
/// constraint holds or the attempt budget runs out.
fn sample_tokens(terrains: &[Terrain], rng: &mut StdRng) -> Vec<u8> {
    let geo = geometry();
    let mut tokens = NUMBER_TOKENS.to_vec();
    for _ in 0..TOKEN_RESAMPLE_ATTEMPTS {
        tokens.shuffle(rng);
        if red_token_violations(geo, terrains, &tokens).is_empty() {
            break;
        }
    }
    tokens
}

/// Swap offending 6/8 tokens with random non-6/8 tokens until the layout is
/// clean or the pass budget runs out.
fn repair_tokens(
    geo: &crate::hex::Geometry,
    terrains: &[Terrain],
    tokens: &mut [u8],
    rng: &mut StdRng,
) {
    for _ in 0..TOKEN_REPAIR_PASSES {
        let offenders = red_token_violations(geo, terrains, tokens);
        if offenders.is_empty() {
            return;
        }
        let calm: Vec<usize> = (0..tokens.len())
            .filter(|&i| !is_red(tokens[i]))
            .collect();
        for &hot in &offenders {
            if let Some(&target) = calm.choose(rng) {
                tokens.swap(hot, target);
            }
        }
    }
}

fn is_red(token: u8) -> bool {
    token == 6 || token == 8
}

/// Token indices (into the non-desert assignment order) of 6/8 tokens that
/// sit edge-adjacent to another 6/8 token.
fn red_token_violations(
    geo: &crate::hex::Geometry,
    terrains: &[Terrain],
    tokens: &[u8],
) -> Vec<usize> {
    // Map hex -> token index for the non-desert hexes, in enumeration order.
    let mut by_hex: HashMap<HexCoord, usize> = HashMap::new();
    let mut token_idx = 0;
    for (i, &coord) in geo.hexes.iter().enumerate() {
        if terrains[i] != Terrain::Desert {
            by_hex.insert(coord, token_idx);
            token_idx += 1;
        }
    }

    let mut offenders = Vec::new();
    for (&hex, &idx) in &by_hex {
        if !is_red(tokens[idx]) {
            continue;
        }
        let clash = hex.neighbors().iter().any(|n| {
            by_hex
                .get(n)
                .is_some_and(|&other| is_red(tokens[other]))
        });
        if clash {
            offenders.push(idx);
        }
    }
    offenders.sort_unstable();
    offenders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::VertexDir;

    fn board(seed: u64) -> Board {
        Board::generate(seed).0
    }

    #[test]
    fn generation_is_deterministic() {
        let (a, seed_a) = Board::generate(42);
        let (b, seed_b) = Board::generate(42);
        assert_eq!(seed_a, seed_b);
        for tile in a.tiles() {
            let other = b.tile(&tile.coord).unwrap();
            assert_eq!(tile.terrain, other.terrain);
            assert_eq!(tile.token, other.token);
        }
        assert_eq!(a.robber(), b.robber());
        for (pa, pb) in a.ports().iter().zip(b.ports()) {
            assert_eq!(pa.edge, pb.edge);
            assert_eq!(pa.kind, pb.kind);
        }
    }

    #[test]
    fn generated_board_has_standard_composition() {
        let board = board(7);
        assert_eq!(board.tiles().count(), 19);

        let deserts = board
            .tiles()
            .filter(|t| t.terrain == Terrain::Desert)
            .count();
        assert_eq!(deserts, 1);

        let mut tokens: Vec<u8> = board.tiles().filter_map(|t| t.token).collect();
        tokens.sort_unstable();
        let mut expected = NUMBER_TOKENS.to_vec();
        expected.sort_unstable();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn robber_starts_on_desert() {
        for seed in 0..20 {
            let board = board(seed);
            let tile = board.tile(&board.robber()).unwrap();
            assert_eq!(tile.terrain, Terrain::Desert);
            assert_eq!(tile.token, None);
        }
    }

    #[test]
    fn no_adjacent_red_tokens() {
        for seed in 0..50 {
            let board = board(seed);
            for tile in board.tiles() {
                if !matches!(tile.token, Some(6) | Some(8)) {
                    continue;
                }
                for neighbor in tile.coord.neighbors() {
                    if let Some(other) = board.tile(&neighbor) {
                        assert!(
                            !matches!(other.token, Some(6) | Some(8)),
                            "seed {}: 6/8 tokens adjacent at {} and {}",
                            seed,
                            tile.coord,
                            neighbor
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn ports_cover_all_kinds() {
        let board = board(3);
        assert_eq!(board.ports().len(), 9);
        let generic = board
            .ports()
            .iter()
            .filter(|p| p.kind == PortKind::Generic)
            .count();
        assert_eq!(generic, 4);
        for kind in [
            PortKind::Wood,
            PortKind::Brick,
            PortKind::Sheep,
            PortKind::Wheat,
            PortKind::Ore,
        ] {
            assert_eq!(board.ports().iter().filter(|p| p.kind == kind).count(), 1);
        }
    }

    #[test]
    fn distance_rule_blocks_neighbors() {
        let mut board = board(0);
        let vertex = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        assert!(board.distance_rule_ok(&vertex));

        board.place_settlement(vertex, 0);
        for adj in vertex.adjacent_vertices() {
            if board.is_board_vertex(&adj) {
                assert!(!board.distance_rule_ok(&adj));
            }
        }
        // Two edges away is fine again.
        let far = VertexCoord::new(HexCoord::new(1, 0), VertexDir::N);
        assert!(board.distance_rule_ok(&far));
    }

    #[test]
    fn road_connectivity_blocked_by_enemy_building() {
        let mut board = board(0);
        let vertex = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        let edges = geometry().vertex_edges[&vertex].clone();

        board.place_settlement(vertex, 0);
        assert!(board.road_connects(&edges[0], 0));

        board.place_road(edges[0], 0);
        // Extend from the far end of that road.
        let far = edges[0]
            .endpoints()
            .into_iter()
            .find(|v| *v != vertex)
            .unwrap();
        let next = geometry().vertex_edges[&far]
            .iter()
            .copied()
            .find(|e| *e != edges[0])
            .unwrap();
        assert!(board.road_connects(&next, 0));

        // An enemy settlement on the far vertex blocks pass-through.
        board.place_settlement(far, 1);
        assert!(!board.road_connects(&next, 0));
    }

    #[test]
    fn production_claims_respect_robber_and_multiplier() {
        let mut board = board(0);
        let geo = geometry();
        // A corner whose other hexes carry different tokens, so exactly one
        // tile produces on this roll.
        let (tile, vertex) = board
            .tiles()
            .filter(|t| t.token.is_some())
            .find_map(|t| {
                geo.hex_vertices[&t.coord]
                    .iter()
                    .copied()
                    .find(|v| {
                        geo.vertex_hexes[v].iter().all(|h| {
                            *h == t.coord
                                || board.tile(h).is_none_or(|o| o.token != t.token)
                        })
                    })
                    .map(|v| (t.clone(), v))
            })
            .unwrap();
        let roll = tile.token.unwrap();

        board.place_settlement(vertex, 0);
        let claims = board.production_claims(roll);
        assert_eq!(
            claims[&0][&tile.terrain.resource().unwrap()],
            1,
            "settlement claims one"
        );

        board.upgrade_to_city(vertex, 0);
        let claims = board.production_claims(roll);
        assert_eq!(claims[&0][&tile.terrain.resource().unwrap()], 2);

        board.move_robber(tile.coord);
        let claims = board.production_claims(roll);
        assert!(claims.get(&0).is_none_or(|m| m.is_empty()));
    }

    /// Build a 6-road chain for player 0 starting from the NE edge of the
    /// center hex, returning the traversed vertices in order.
    fn build_chain(board: &mut Board, length: usize) -> Vec<VertexCoord> {
        let geo = geometry();
        let mut edge = EdgeCoord::new(HexCoord::new(0, 0), Wind::NE);
        let [start, mut tip] = geo.edge_vertices[&edge];
        let mut path = vec![start, tip];
        board.place_road(edge, 0);
        while path.len() <= length {
            let mut options: Vec<EdgeCoord> = geo.vertex_edges[&tip]
                .iter()
                .copied()
                .filter(|e| *e != edge && board.road_owner(e).is_none())
                .collect();
            options.sort();
            let next = options[0];
            board.place_road(next, 0);
            let [a, b] = geo.edge_vertices[&next];
            tip = if a == tip { b } else { a };
            path.push(tip);
            edge = next;
        }
        path
    }

    #[test]
    fn longest_road_counts_chain() {
        let mut board = board(0);
        build_chain(&mut board, 6);
        assert_eq!(board.longest_road(0), 6);
        assert_eq!(board.longest_road(1), 0);
    }

    #[test]
    fn enemy_settlement_cleaves_road() {
        let mut board = board(0);
        let path = build_chain(&mut board, 6);
        // Midpoint of the chain: three roads on each side.
        let mid = path[3];
        board.place_settlement(mid, 1);
        assert_eq!(board.longest_road(0), 3);
    }

    #[test]
    fn own_settlement_does_not_cleave() {
        let mut board = board(0);
        let path = build_chain(&mut board, 6);
        board.place_settlement(path[3], 0);
        assert_eq!(board.longest_road(0), 6);
    }

    #[test]
    fn port_lookup_from_vertex() {
        let board = board(0);
        let port = &board.ports()[0];
        let [a, _] = port.edge.endpoints();
        assert!(board.ports_at_vertex(&a).contains(&port.kind));
    }
}
