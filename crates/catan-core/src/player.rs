//! Players, resources, the shared bank and development cards.

use crate::board::{PlayerId, PortKind};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The five resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Wood,
    Brick,
    Sheep,
    Wheat,
    Ore,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Wood,
        Resource::Brick,
        Resource::Sheep,
        Resource::Wheat,
        Resource::Ore,
    ];
}

/// A bundle of resource cards: a player's hand, a cost, or a trade side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceBundle {
    pub wood: u32,
    pub brick: u32,
    pub sheep: u32,
    pub wheat: u32,
    pub ore: u32,
}

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_amounts(wood: u32, brick: u32, sheep: u32, wheat: u32, ore: u32) -> Self {
        Self {
            wood,
            brick,
            sheep,
            wheat,
            ore,
        }
    }

    /// A bundle holding `amount` of a single resource.
    pub fn single(resource: Resource, amount: u32) -> Self {
        let mut bundle = Self::new();
        bundle.add(resource, amount);
        bundle
    }

    pub fn total(&self) -> u32 {
        self.wood + self.brick + self.sheep + self.wheat + self.ore
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Wood => self.wood,
            Resource::Brick => self.brick,
            Resource::Sheep => self.sheep,
            Resource::Wheat => self.wheat,
            Resource::Ore => self.ore,
        }
    }

    pub fn set(&mut self, resource: Resource, count: u32) {
        match resource {
            Resource::Wood => self.wood = count,
            Resource::Brick => self.brick = count,
            Resource::Sheep => self.sheep = count,
            Resource::Wheat => self.wheat = count,
            Resource::Ore => self.ore = count,
        }
    }

    pub fn add(&mut self, resource: Resource, amount: u32) {
        self.set(resource, self.get(resource) + amount);
    }

    pub fn add_bundle(&mut self, other: &ResourceBundle) {
        for resource in Resource::ALL {
            self.add(resource, other.get(resource));
        }
    }

    /// Whether every count in `cost` is covered.
    pub fn can_afford(&self, cost: &ResourceBundle) -> bool {
        Resource::ALL
            .iter()
            .all(|&r| self.get(r) >= cost.get(r))
    }

    /// Subtract a cost. Callers validate affordability first.
    pub fn subtract(&mut self, cost: &ResourceBundle) {
        assert!(self.can_afford(cost), "bundle cannot cover cost");
        for resource in Resource::ALL {
            self.set(resource, self.get(resource) - cost.get(resource));
        }
    }

    /// If the bundle holds exactly one resource type, that type and count.
    pub fn single_kind(&self) -> Option<(Resource, u32)> {
        let mut found = None;
        for resource in Resource::ALL {
            let count = self.get(resource);
            if count > 0 {
                if found.is_some() {
                    return None;
                }
                found = Some((resource, count));
            }
        }
        found
    }

    /// Draw one card uniformly from the multiset of cards in this bundle
    /// (one of N cards, not one of five types).
    pub fn draw_random<R: Rng>(&mut self, rng: &mut R) -> Option<Resource> {
        let mut cards: Vec<Resource> = Vec::with_capacity(self.total() as usize);
        for resource in Resource::ALL {
            for _ in 0..self.get(resource) {
                cards.push(resource);
            }
        }
        let drawn = *cards.choose(rng)?;
        self.subtract(&ResourceBundle::single(drawn, 1));
        Some(drawn)
    }
}

/// Building and card costs.
pub mod costs {
    use super::ResourceBundle;

    /// Road: 1 wood, 1 brick.
    pub fn road() -> ResourceBundle {
        ResourceBundle::with_amounts(1, 1, 0, 0, 0)
    }

    /// Settlement: 1 wood, 1 brick, 1 sheep, 1 wheat.
    pub fn settlement() -> ResourceBundle {
        ResourceBundle::with_amounts(1, 1, 1, 1, 0)
    }

    /// City upgrade: 2 wheat, 3 ore.
    pub fn city() -> ResourceBundle {
        ResourceBundle::with_amounts(0, 0, 0, 2, 3)
    }

    /// Development card: 1 sheep, 1 wheat, 1 ore.
    pub fn dev_card() -> ResourceBundle {
        ResourceBundle::with_amounts(0, 0, 1, 1, 1)
    }
}

/// The shared supply: 19 of each resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    stock: ResourceBundle,
}

impl Bank {
    pub const INITIAL_PER_RESOURCE: u32 = 19;

    pub fn new() -> Self {
        Self {
            stock: ResourceBundle::with_amounts(19, 19, 19, 19, 19),
        }
    }

    pub fn stock(&self) -> &ResourceBundle {
        &self.stock
    }

    pub fn has(&self, resource: Resource, amount: u32) -> bool {
        self.stock.get(resource) >= amount
    }

    pub fn withdraw(&mut self, resource: Resource, amount: u32) {
        self.stock.subtract(&ResourceBundle::single(resource, amount));
    }

    pub fn deposit(&mut self, resource: Resource, amount: u32) {
        self.stock.add(resource, amount);
    }

    pub fn deposit_bundle(&mut self, bundle: &ResourceBundle) {
        self.stock.add_bundle(bundle);
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

/// Development card types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevCardKind {
    Knight,
    VictoryPoint,
    RoadBuilding,
    YearOfPlenty,
    Monopoly,
}

impl DevCardKind {
    /// The standard 25-card deck, unshuffled.
    pub fn standard_deck() -> Vec<DevCardKind> {
        let mut deck = Vec::with_capacity(25);
        deck.extend(std::iter::repeat(DevCardKind::Knight).take(14));
        deck.extend(std::iter::repeat(DevCardKind::VictoryPoint).take(5));
        deck.extend(std::iter::repeat(DevCardKind::RoadBuilding).take(2));
        deck.extend(std::iter::repeat(DevCardKind::YearOfPlenty).take(2));
        deck.extend(std::iter::repeat(DevCardKind::Monopoly).take(2));
        deck
    }
}

/// A development card in a player's hand, stamped with the turn it was
/// bought. Non-VP cards only become playable on a later turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevCard {
    pub kind: DevCardKind,
    #[serde(rename = "turnAcquired")]
    pub turn_acquired: u32,
}

/// Seat colors, assigned by join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    Red,
    Blue,
    White,
    Orange,
}

impl PlayerColor {
    pub fn for_seat(id: PlayerId) -> Self {
        match id % 4 {
            0 => PlayerColor::Red,
            1 => PlayerColor::Blue,
            2 => PlayerColor::White,
            _ => PlayerColor::Orange,
        }
    }
}

/// One seat's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub resources: ResourceBundle,
    pub dev_cards: Vec<DevCard>,
    pub knights_played: u32,
    pub has_longest_road: bool,
    pub has_largest_army: bool,
    /// Cached result of the last longest-road computation.
    pub longest_road_length: u32,
    pub settlements_remaining: u32,
    pub cities_remaining: u32,
    pub roads_remaining: u32,
    /// Port types reachable from this player's buildings.
    pub ports: HashSet<PortKind>,
    pub connected: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            color: PlayerColor::for_seat(id),
            resources: ResourceBundle::new(),
            dev_cards: Vec::new(),
            knights_played: 0,
            has_longest_road: false,
            has_largest_army: false,
            longest_road_length: 0,
            settlements_remaining: 5,
            cities_remaining: 4,
            roads_remaining: 15,
            ports: HashSet::new(),
            connected: true,
        }
    }

    /// Hidden victory points from VP cards.
    pub fn vp_card_count(&self) -> u32 {
        self.dev_cards
            .iter()
            .filter(|c| c.kind == DevCardKind::VictoryPoint)
            .count() as u32
    }

    /// Whether the player holds a card of this kind bought before the
    /// current turn.
    pub fn has_playable_dev_card(&self, kind: DevCardKind, current_turn: u32) -> bool {
        self.dev_cards
            .iter()
            .any(|c| c.kind == kind && c.turn_acquired < current_turn)
    }

    /// Remove the oldest playable card of this kind from the hand. A knight
    /// leaving the hand bumps the army counter.
    pub fn play_dev_card(&mut self, kind: DevCardKind, current_turn: u32) -> bool {
        let pos = self
            .dev_cards
            .iter()
            .position(|c| c.kind == kind && c.turn_acquired < current_turn);
        match pos {
            Some(pos) => {
                self.dev_cards.remove(pos);
                if kind == DevCardKind::Knight {
                    self.knights_played += 1;
                }
                true
            }
            None => false,
        }
    }

    /// Best bank-trade rate for giving away this resource: 2 with a matching
    /// 2:1 port, 3 with any generic port, 4 otherwise.
    pub fn trade_rate(&self, resource: Resource) -> u32 {
        if self.ports.iter().any(|p| p.resource() == Some(resource)) {
            2
        } else if self.ports.contains(&PortKind::Generic) {
            3
        } else {
            4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bundle_totals_and_affordability() {
        let hand = ResourceBundle::with_amounts(1, 2, 3, 4, 5);
        assert_eq!(hand.total(), 15);
        assert!(hand.can_afford(&ResourceBundle::with_amounts(1, 1, 1, 1, 1)));
        assert!(!hand.can_afford(&ResourceBundle::with_amounts(2, 0, 0, 0, 0)));
    }

    #[test]
    fn bundle_subtract() {
        let mut hand = ResourceBundle::with_amounts(3, 3, 3, 3, 3);
        hand.subtract(&costs::settlement());
        assert_eq!(hand, ResourceBundle::with_amounts(2, 2, 2, 2, 3));
    }

    #[test]
    fn single_kind_detection() {
        assert_eq!(
            ResourceBundle::single(Resource::Ore, 4).single_kind(),
            Some((Resource::Ore, 4))
        );
        assert_eq!(ResourceBundle::new().single_kind(), None);
        assert_eq!(
            ResourceBundle::with_amounts(1, 0, 0, 1, 0).single_kind(),
            None
        );
    }

    #[test]
    fn draw_random_takes_one_card() {
        let mut hand = ResourceBundle::single(Resource::Wheat, 1);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(hand.draw_random(&mut rng), Some(Resource::Wheat));
        assert!(hand.is_empty());
        assert_eq!(hand.draw_random(&mut rng), None);
    }

    #[test]
    fn costs_are_the_rulebook_costs() {
        assert_eq!(costs::road().total(), 2);
        assert_eq!(costs::settlement().total(), 4);
        assert_eq!(costs::city().total(), 5);
        assert_eq!(costs::dev_card().total(), 3);
    }

    #[test]
    fn deck_composition() {
        let deck = DevCardKind::standard_deck();
        assert_eq!(deck.len(), 25);
        let count = |kind| deck.iter().filter(|&&k| k == kind).count();
        assert_eq!(count(DevCardKind::Knight), 14);
        assert_eq!(count(DevCardKind::VictoryPoint), 5);
        assert_eq!(count(DevCardKind::RoadBuilding), 2);
        assert_eq!(count(DevCardKind::YearOfPlenty), 2);
        assert_eq!(count(DevCardKind::Monopoly), 2);
    }

    #[test]
    fn bank_starts_with_nineteen_each() {
        let bank = Bank::new();
        for resource in Resource::ALL {
            assert_eq!(bank.stock().get(resource), 19);
        }
    }

    #[test]
    fn dev_card_unplayable_on_purchase_turn() {
        let mut player = Player::new(0, "Ada".into());
        player.dev_cards.push(DevCard {
            kind: DevCardKind::Knight,
            turn_acquired: 4,
        });

        assert!(!player.has_playable_dev_card(DevCardKind::Knight, 4));
        assert!(player.has_playable_dev_card(DevCardKind::Knight, 5));

        assert!(!player.play_dev_card(DevCardKind::Knight, 4));
        assert!(player.play_dev_card(DevCardKind::Knight, 5));
        assert_eq!(player.knights_played, 1);
        assert!(player.dev_cards.is_empty());
    }

    #[test]
    fn trade_rate_prefers_specific_port() {
        let mut player = Player::new(1, "Grace".into());
        assert_eq!(player.trade_rate(Resource::Wood), 4);

        player.ports.insert(PortKind::Generic);
        assert_eq!(player.trade_rate(Resource::Wood), 3);

        player.ports.insert(PortKind::Wood);
        assert_eq!(player.trade_rate(Resource::Wood), 2);
        assert_eq!(player.trade_rate(Resource::Ore), 3);
    }

    #[test]
    fn colors_follow_join_order() {
        assert_eq!(PlayerColor::for_seat(0), PlayerColor::Red);
        assert_eq!(PlayerColor::for_seat(1), PlayerColor::Blue);
        assert_eq!(PlayerColor::for_seat(2), PlayerColor::White);
        assert_eq!(PlayerColor::for_seat(3), PlayerColor::Orange);
    }
}
