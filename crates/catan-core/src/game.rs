//! The rule engine: phase machine, action validation and the pure `dispatch`
//! reducer.
//!
//! `dispatch` never mutates the input state. It validates the action against
//! the current state, applies it to a clone and returns the clone together
//! with the events describing the transition. All randomness flows through
//! the in-state `seed` cursor, so replaying the same initial state and action
//! sequence reproduces the game bit for bit.

use crate::actions::{
    GameEvent, PlayerAction, ResourceGrant, TradeId, TradeOffer, TradeResponse, TradeStatus,
};
use crate::board::{Board, BuildingKind, PlayerId};
use crate::hex::{geometry, EdgeCoord, HexCoord, VertexCoord};
use crate::player::{costs, Bank, DevCard, DevCardKind, Player, Resource, ResourceBundle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Victory points needed to win.
pub const VICTORY_POINTS_TO_WIN: u32 = 10;
/// Minimum road length for the Longest Road bonus.
pub const LONGEST_ROAD_MINIMUM: u32 = 5;
/// Minimum played knights for the Largest Army bonus.
pub const LARGEST_ARMY_MINIMUM: u32 = 3;
/// Hands larger than this discard half on a seven.
const DISCARD_THRESHOLD: u32 = 7;

/// Typed rejection reasons. The message is what reaches the client in
/// `ACTION_REJECTED`; a rejection never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("The game is over")]
    GameOver,
    #[error("Not your turn")]
    NotYourTurn,
    #[error("That action is not allowed in the current phase")]
    WrongPhase,
    #[error("That location is not on the board")]
    OffBoard,
    #[error("That spot is already occupied")]
    Occupied,
    #[error("Too close to another settlement (distance rule)")]
    DistanceRule,
    #[error("Settlement must connect to one of your roads")]
    SettlementNotConnected,
    #[error("Road must connect to your road network")]
    RoadNotConnected,
    #[error("Road must touch the settlement you just placed")]
    SetupRoadDetached,
    #[error("Not enough resources for a {0}")]
    CannotAfford(&'static str),
    #[error("No {0} pieces remaining")]
    NoPiecesRemaining(&'static str),
    #[error("You must upgrade one of your own settlements")]
    NoSettlementToUpgrade,
    #[error("The development card deck is empty")]
    DeckEmpty,
    #[error("You don't have that development card ready to play")]
    NoPlayableCard,
    #[error("Only one development card may be played per turn")]
    DevCardAlreadyPlayed,
    #[error("Robber must move to a different hex")]
    RobberMustMove,
    #[error("That player cannot be robbed")]
    InvalidStealTarget,
    #[error("You have no pending discard")]
    NoPendingDiscard,
    #[error("Discard must total exactly {0} cards")]
    WrongDiscardCount(u32),
    #[error("You don't hold those resources")]
    MissingResources,
    #[error("Trade offers need resources on both sides")]
    EmptyTrade,
    #[error("No such trade offer")]
    UnknownTrade,
    #[error("Trade offer is no longer open")]
    TradeNotOpen,
    #[error("Only the proposer can do that")]
    NotProposer,
    #[error("You cannot respond to your own offer")]
    OwnOffer,
    #[error("That player has not accepted the offer")]
    NotAccepted,
    #[error("Bank doesn't have enough of that resource")]
    BankShort,
    #[error("Bank trades give one resource type at your port rate")]
    BadBankTrade,
}

/// What the acting player places during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupPlacing {
    #[serde(rename = "PLACE_SETTLEMENT")]
    Settlement,
    #[serde(rename = "PLACE_ROAD")]
    Road,
}

/// Sub-phase of a MAIN-phase turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MainSub {
    RollDice,
    Discard,
    MoveRobber,
    Steal,
    TradeBuildPlay,
}

/// Top-level phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "phase",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Phase {
    Setup {
        /// Snake order of seats: 0,1,...,n-1,n-1,...,1,0.
        setup_order: Vec<PlayerId>,
        /// Index into `setup_order`.
        setup_step: usize,
        placing: SetupPlacing,
        /// Remembered to constrain the road that follows the settlement, and
        /// to grant second-round starting resources.
        last_settlement: Option<VertexCoord>,
    },
    Main {
        sub: MainSub,
    },
    GameOver,
}

/// Per-turn bookkeeping around the phase machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnState {
    pub phase: Phase,
    pub current_player: PlayerId,
    /// Starts at 1 once setup completes.
    pub turn_number: u32,
    pub dice_roll: Option<(u8, u8)>,
    /// Seats that still owe a discard after a seven, with the owed count.
    pub pending_discards: HashMap<PlayerId, u32>,
    /// Free roads left from a Road Building card.
    pub road_building_roads_left: u8,
    /// Candidate victims after a robber move with several choices.
    pub must_steal_from: Vec<PlayerId>,
    pub dev_card_played_this_turn: bool,
    pub dev_card_bought_this_turn: bool,
}

/// The complete authoritative game state.
#[derive(Debug, Clone)]
pub struct GameState {
    pub game_id: String,
    pub board: Board,
    pub players: Vec<Player>,
    pub turn: TurnState,
    /// Remaining deck, top of the deck at index 0.
    pub dev_deck: Vec<DevCardKind>,
    /// Open offers only; executed and cancelled offers are dropped.
    pub trade_offers: Vec<TradeOffer>,
    next_trade_id: TradeId,
    pub winner: Option<PlayerId>,
    /// Append-only, human-readable history.
    pub log: Vec<String>,
    pub bank: Bank,
    /// RNG cursor; advanced on every random draw.
    pub seed: u64,
}

impl GameState {
    /// Create a game: seeded board, shuffled deck, setup snake order.
    pub fn new(game_id: impl Into<String>, player_names: Vec<String>, seed: u64) -> Self {
        let count = player_names.len();
        assert!((2..=4).contains(&count), "games take 2-4 players");

        let (board, seed) = Board::generate(seed);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut dev_deck = DevCardKind::standard_deck();
        dev_deck.shuffle(&mut rng);
        let seed = rng.gen();

        let players: Vec<Player> = player_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Player::new(i as PlayerId, name))
            .collect();

        let setup_order: Vec<PlayerId> = (0..count as PlayerId)
            .chain((0..count as PlayerId).rev())
            .collect();

        let game_id = game_id.into();
        Self {
            log: vec![format!("Game {} created with {} players", game_id, count)],
            game_id,
            board,
            players,
            turn: TurnState {
                phase: Phase::Setup {
                    setup_order,
                    setup_step: 0,
                    placing: SetupPlacing::Settlement,
                    last_settlement: None,
                },
                current_player: 0,
                turn_number: 0,
                dice_roll: None,
                pending_discards: HashMap::new(),
                road_building_roads_left: 0,
                must_steal_from: Vec::new(),
                dev_card_played_this_turn: false,
                dev_card_bought_this_turn: false,
            },
            dev_deck,
            trade_offers: Vec::new(),
            next_trade_id: 1,
            winner: None,
            bank: Bank::new(),
            seed,
        }
    }

    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id as usize]
    }

    fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        &mut self.players[id as usize]
    }

    fn name(&self, id: PlayerId) -> String {
        self.player(id).name.clone()
    }

    /// Total victory points: buildings on the board, bonuses, hidden VP
    /// cards.
    pub fn score(&self, id: PlayerId) -> u32 {
        let player = self.player(id);
        let mut vp = self.board.settlement_count(id) + 2 * self.board.city_count(id);
        if player.has_longest_road {
            vp += 2;
        }
        if player.has_largest_army {
            vp += 2;
        }
        vp + player.vp_card_count()
    }

    /// Score visible to opponents: excludes hidden VP cards.
    pub fn public_score(&self, id: PlayerId) -> u32 {
        self.score(id) - self.player(id).vp_card_count()
    }

    /// Seed the next random draw and advance the cursor.
    fn next_rng(&mut self) -> StdRng {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.seed = rng.gen();
        rng
    }

    fn set_sub(&mut self, sub: MainSub) {
        self.turn.phase = Phase::Main { sub };
    }

    // ==================== Dispatch ====================

    /// Validate and apply one action. Pure: the receiver is untouched; a new
    /// state and the transition's events come back on success, a typed
    /// rejection on failure.
    pub fn dispatch(
        &self,
        actor: PlayerId,
        action: &PlayerAction,
    ) -> Result<(GameState, Vec<GameEvent>), GameError> {
        self.validate(actor, action)?;

        let mut next = self.clone();
        let mut events = Vec::new();
        next.apply(actor, action, &mut events);

        if next.winner.is_none() && matches!(next.turn.phase, Phase::Main { .. }) {
            next.check_victory(&mut events);
        }
        Ok((next, events))
    }

    // ==================== Validation ====================

    fn validate(&self, actor: PlayerId, action: &PlayerAction) -> Result<(), GameError> {
        if (actor as usize) >= self.players.len() {
            return Err(GameError::NotYourTurn);
        }
        match &self.turn.phase {
            Phase::GameOver => Err(GameError::GameOver),
            Phase::Setup {
                setup_order,
                setup_step,
                placing,
                last_settlement,
            } => {
                if setup_order.get(*setup_step).copied() != Some(actor) {
                    return Err(GameError::NotYourTurn);
                }
                match (placing, action) {
                    (SetupPlacing::Settlement, PlayerAction::PlaceSettlement { vertex }) => {
                        self.validate_settlement_spot(vertex)
                    }
                    (SetupPlacing::Road, PlayerAction::PlaceRoad { edge }) => {
                        if !self.board.is_board_edge(edge) {
                            return Err(GameError::OffBoard);
                        }
                        if self.board.road_owner(edge).is_some() {
                            return Err(GameError::Occupied);
                        }
                        let settlement = (*last_settlement).ok_or(GameError::WrongPhase)?;
                        if !edge.endpoints().contains(&settlement) {
                            return Err(GameError::SetupRoadDetached);
                        }
                        Ok(())
                    }
                    _ => Err(GameError::WrongPhase),
                }
            }
            Phase::Main { sub } => self.validate_main(*sub, actor, action),
        }
    }

    fn validate_main(
        &self,
        sub: MainSub,
        actor: PlayerId,
        action: &PlayerAction,
    ) -> Result<(), GameError> {
        // The two actions open to players out of turn.
        match action {
            PlayerAction::DiscardResources { resources } => {
                if sub != MainSub::Discard {
                    return Err(GameError::WrongPhase);
                }
                let required = *self
                    .turn
                    .pending_discards
                    .get(&actor)
                    .ok_or(GameError::NoPendingDiscard)?;
                if resources.total() != required {
                    return Err(GameError::WrongDiscardCount(required));
                }
                if !self.player(actor).resources.can_afford(resources) {
                    return Err(GameError::MissingResources);
                }
                return Ok(());
            }
            PlayerAction::RespondToTrade { trade_id, .. } => {
                let offer = self.trade(*trade_id)?;
                if offer.status != TradeStatus::Open {
                    return Err(GameError::TradeNotOpen);
                }
                if offer.proposer == actor {
                    return Err(GameError::OwnOffer);
                }
                return Ok(());
            }
            _ => {}
        }

        if actor != self.turn.current_player {
            return Err(GameError::NotYourTurn);
        }

        // Knight is legal both before the roll and in the build phase.
        if let PlayerAction::PlayKnight { robber_hex } = action {
            if !matches!(sub, MainSub::RollDice | MainSub::TradeBuildPlay) {
                return Err(GameError::WrongPhase);
            }
            self.validate_dev_card_play(actor, DevCardKind::Knight)?;
            return self.validate_robber_hex(robber_hex);
        }

        match sub {
            MainSub::RollDice => match action {
                PlayerAction::RollDice => Ok(()),
                _ => Err(GameError::WrongPhase),
            },
            MainSub::Discard => Err(GameError::WrongPhase),
            MainSub::MoveRobber => match action {
                PlayerAction::MoveRobber { hex } => self.validate_robber_hex(hex),
                _ => Err(GameError::WrongPhase),
            },
            MainSub::Steal => match action {
                PlayerAction::Steal { target_player_id } => {
                    if !self.turn.must_steal_from.contains(target_player_id) {
                        return Err(GameError::InvalidStealTarget);
                    }
                    Ok(())
                }
                _ => Err(GameError::WrongPhase),
            },
            MainSub::TradeBuildPlay => self.validate_build_phase(actor, action),
        }
    }

    fn validate_build_phase(&self, actor: PlayerId, action: &PlayerAction) -> Result<(), GameError> {
        let player = self.player(actor);
        match action {
            PlayerAction::PlaceSettlement { vertex } => {
                self.validate_settlement_spot(vertex)?;
                if !self.board.touches_own_road(vertex, actor) {
                    return Err(GameError::SettlementNotConnected);
                }
                if player.settlements_remaining == 0 {
                    return Err(GameError::NoPiecesRemaining("settlement"));
                }
                if !player.resources.can_afford(&costs::settlement()) {
                    return Err(GameError::CannotAfford("settlement"));
                }
                Ok(())
            }
            PlayerAction::PlaceRoad { edge } => {
                if !self.board.is_board_edge(edge) {
                    return Err(GameError::OffBoard);
                }
                if self.board.road_owner(edge).is_some() {
                    return Err(GameError::Occupied);
                }
                if !self.board.road_connects(edge, actor) {
                    return Err(GameError::RoadNotConnected);
                }
                if player.roads_remaining == 0 {
                    return Err(GameError::NoPiecesRemaining("road"));
                }
                if self.turn.road_building_roads_left == 0
                    && !player.resources.can_afford(&costs::road())
                {
                    return Err(GameError::CannotAfford("road"));
                }
                Ok(())
            }
            PlayerAction::PlaceCity { vertex } => {
                let owns_settlement = self
                    .board
                    .building(vertex)
                    .is_some_and(|b| b.owner == actor && b.kind == BuildingKind::Settlement);
                if !owns_settlement {
                    return Err(GameError::NoSettlementToUpgrade);
                }
                if player.cities_remaining == 0 {
                    return Err(GameError::NoPiecesRemaining("city"));
                }
                if !player.resources.can_afford(&costs::city()) {
                    return Err(GameError::CannotAfford("city"));
                }
                Ok(())
            }
            PlayerAction::BuyDevCard => {
                if self.dev_deck.is_empty() {
                    return Err(GameError::DeckEmpty);
                }
                if !player.resources.can_afford(&costs::dev_card()) {
                    return Err(GameError::CannotAfford("development card"));
                }
                Ok(())
            }
            PlayerAction::PlayRoadBuilding => {
                self.validate_dev_card_play(actor, DevCardKind::RoadBuilding)?;
                if player.roads_remaining == 0 {
                    return Err(GameError::NoPiecesRemaining("road"));
                }
                Ok(())
            }
            PlayerAction::PlayYearOfPlenty { resources } => {
                self.validate_dev_card_play(actor, DevCardKind::YearOfPlenty)?;
                let mut wanted = ResourceBundle::new();
                wanted.add(resources[0], 1);
                wanted.add(resources[1], 1);
                for resource in Resource::ALL {
                    if !self.bank.has(resource, wanted.get(resource)) {
                        return Err(GameError::BankShort);
                    }
                }
                Ok(())
            }
            PlayerAction::PlayMonopoly { .. } => {
                self.validate_dev_card_play(actor, DevCardKind::Monopoly)
            }
            PlayerAction::ProposeTrade {
                offering,
                requesting,
            } => {
                if offering.is_empty() || requesting.is_empty() {
                    return Err(GameError::EmptyTrade);
                }
                if !player.resources.can_afford(offering) {
                    return Err(GameError::MissingResources);
                }
                Ok(())
            }
            PlayerAction::ConfirmTrade {
                trade_id,
                with_player_id,
            } => {
                let offer = self.trade(*trade_id)?;
                if offer.status != TradeStatus::Open {
                    return Err(GameError::TradeNotOpen);
                }
                if offer.proposer != actor {
                    return Err(GameError::NotProposer);
                }
                if offer.responses.get(with_player_id) != Some(&TradeResponse::Accepted) {
                    return Err(GameError::NotAccepted);
                }
                // Both sides are re-checked at confirm time.
                if !self.player(actor).resources.can_afford(&offer.offering) {
                    return Err(GameError::MissingResources);
                }
                if !self
                    .player(*with_player_id)
                    .resources
                    .can_afford(&offer.requesting)
                {
                    return Err(GameError::MissingResources);
                }
                Ok(())
            }
            PlayerAction::CancelTrade { trade_id } => {
                let offer = self.trade(*trade_id)?;
                if offer.status != TradeStatus::Open {
                    return Err(GameError::TradeNotOpen);
                }
                if offer.proposer != actor {
                    return Err(GameError::NotProposer);
                }
                Ok(())
            }
            PlayerAction::BankTrade { giving, receiving } => {
                let (give, count) = giving.single_kind().ok_or(GameError::BadBankTrade)?;
                if give == *receiving {
                    return Err(GameError::BadBankTrade);
                }
                if count != player.trade_rate(give) {
                    return Err(GameError::BadBankTrade);
                }
                if !player.resources.can_afford(giving) {
                    return Err(GameError::MissingResources);
                }
                if !self.bank.has(*receiving, 1) {
                    return Err(GameError::BankShort);
                }
                Ok(())
            }
            PlayerAction::EndTurn => Ok(()),
            PlayerAction::RollDice
            | PlayerAction::MoveRobber { .. }
            | PlayerAction::Steal { .. }
            | PlayerAction::DiscardResources { .. }
            | PlayerAction::RespondToTrade { .. }
            | PlayerAction::PlayKnight { .. } => Err(GameError::WrongPhase),
        }
    }

    fn validate_settlement_spot(&self, vertex: &VertexCoord) -> Result<(), GameError> {
        if !self.board.is_board_vertex(vertex) {
            return Err(GameError::OffBoard);
        }
        if self.board.building(vertex).is_some() {
            return Err(GameError::Occupied);
        }
        if !self.board.distance_rule_ok(vertex) {
            return Err(GameError::DistanceRule);
        }
        Ok(())
    }

    fn validate_robber_hex(&self, hex: &HexCoord) -> Result<(), GameError> {
        if self.board.tile(hex).is_none() {
            return Err(GameError::OffBoard);
        }
        if *hex == self.board.robber() {
            return Err(GameError::RobberMustMove);
        }
        Ok(())
    }

    fn validate_dev_card_play(&self, actor: PlayerId, kind: DevCardKind) -> Result<(), GameError> {
        if self.turn.dev_card_played_this_turn {
            return Err(GameError::DevCardAlreadyPlayed);
        }
        if !self
            .player(actor)
            .has_playable_dev_card(kind, self.turn.turn_number)
        {
            return Err(GameError::NoPlayableCard);
        }
        Ok(())
    }

    fn trade(&self, id: TradeId) -> Result<&TradeOffer, GameError> {
        self.trade_offers
            .iter()
            .find(|t| t.id == id)
            .ok_or(GameError::UnknownTrade)
    }

    // ==================== Application ====================

    /// Apply a validated action. Infallible by construction: `validate`
    /// covered every rejection case against this same state.
    fn apply(&mut self, actor: PlayerId, action: &PlayerAction, events: &mut Vec<GameEvent>) {
        match action {
            PlayerAction::PlaceSettlement { vertex } => match self.turn.phase {
                Phase::Setup { .. } => self.apply_setup_settlement(actor, *vertex, events),
                _ => self.apply_build_settlement(actor, *vertex, events),
            },
            PlayerAction::PlaceRoad { edge } => match self.turn.phase {
                Phase::Setup { .. } => self.apply_setup_road(actor, *edge, events),
                _ => self.apply_build_road(actor, *edge, events),
            },
            PlayerAction::RollDice => self.apply_roll_dice(actor, events),
            PlayerAction::DiscardResources { resources } => {
                self.apply_discard(actor, resources, events)
            }
            PlayerAction::MoveRobber { hex } => {
                self.robber_flow(actor, *hex, events);
            }
            PlayerAction::Steal { target_player_id } => {
                self.steal(actor, *target_player_id, events);
                self.turn.must_steal_from.clear();
                self.set_sub(self.post_robber_sub());
            }
            PlayerAction::PlaceCity { vertex } => self.apply_build_city(actor, *vertex, events),
            PlayerAction::BuyDevCard => self.apply_buy_dev_card(actor, events),
            PlayerAction::PlayKnight { robber_hex } => {
                self.apply_play_knight(actor, *robber_hex, events)
            }
            PlayerAction::PlayRoadBuilding => self.apply_play_road_building(actor, events),
            PlayerAction::PlayYearOfPlenty { resources } => {
                self.apply_year_of_plenty(actor, *resources, events)
            }
            PlayerAction::PlayMonopoly { resource } => {
                self.apply_monopoly(actor, *resource, events)
            }
            PlayerAction::ProposeTrade {
                offering,
                requesting,
            } => self.apply_propose_trade(actor, *offering, *requesting, events),
            PlayerAction::RespondToTrade { trade_id, accept } => {
                self.apply_respond_to_trade(actor, *trade_id, *accept, events)
            }
            PlayerAction::ConfirmTrade {
                trade_id,
                with_player_id,
            } => self.apply_confirm_trade(*trade_id, *with_player_id, events),
            PlayerAction::CancelTrade { trade_id } => self.apply_cancel_trade(*trade_id, events),
            PlayerAction::BankTrade { giving, receiving } => {
                self.apply_bank_trade(actor, giving, *receiving, events)
            }
            PlayerAction::EndTurn => self.apply_end_turn(actor, events),
        }
    }

    // -------- setup --------

    fn apply_setup_settlement(
        &mut self,
        actor: PlayerId,
        vertex: VertexCoord,
        events: &mut Vec<GameEvent>,
    ) {
        self.board.place_settlement(vertex, actor);
        self.player_mut(actor).settlements_remaining -= 1;
        self.grant_port_access(actor, vertex);

        events.push(GameEvent::SettlementBuilt {
            player: actor,
            vertex,
        });
        self.log
            .push(format!("{} placed a settlement", self.name(actor)));

        if let Phase::Setup {
            placing,
            last_settlement,
            ..
        } = &mut self.turn.phase
        {
            *placing = SetupPlacing::Road;
            *last_settlement = Some(vertex);
        }
        self.refresh_longest_road(events);
    }

    fn apply_setup_road(&mut self, actor: PlayerId, edge: EdgeCoord, events: &mut Vec<GameEvent>) {
        self.board.place_road(edge, actor);
        self.player_mut(actor).roads_remaining -= 1;
        events.push(GameEvent::RoadBuilt {
            player: actor,
            edge,
        });
        self.log.push(format!("{} placed a road", self.name(actor)));
        self.refresh_longest_road(events);

        let Phase::Setup {
            setup_order,
            setup_step,
            last_settlement,
            ..
        } = &self.turn.phase
        else {
            return;
        };
        let order_len = setup_order.len();
        let step = *setup_step;
        let settlement = *last_settlement;

        // The second snake round grants starting resources for the
        // settlement this road completes.
        if step >= order_len / 2 {
            if let Some(vertex) = settlement {
                self.grant_starting_resources(actor, vertex, events);
            }
        }

        let next_step = step + 1;
        if next_step == order_len {
            self.turn.current_player = 0;
            self.turn.turn_number = 1;
            self.set_sub(MainSub::RollDice);
            self.log.push("Setup complete".to_string());
        } else if let Phase::Setup {
            setup_order,
            setup_step,
            placing,
            last_settlement,
        } = &mut self.turn.phase
        {
            *setup_step = next_step;
            *placing = SetupPlacing::Settlement;
            *last_settlement = None;
            let next_player = setup_order[next_step];
            self.turn.current_player = next_player;
        }
    }

    fn grant_starting_resources(
        &mut self,
        actor: PlayerId,
        vertex: VertexCoord,
        events: &mut Vec<GameEvent>,
    ) {
        let resources: Vec<Resource> = geometry().vertex_hexes[&vertex]
            .iter()
            .filter_map(|hex| self.board.tile(hex))
            .filter_map(|tile| tile.terrain.resource())
            .collect();

        let mut grants = Vec::new();
        for resource in resources {
            self.bank.withdraw(resource, 1);
            self.player_mut(actor).resources.add(resource, 1);
            grants.push(ResourceGrant {
                player: actor,
                resource,
                amount: 1,
            });
        }
        if !grants.is_empty() {
            self.log.push(format!(
                "{} collected starting resources",
                self.name(actor)
            ));
            events.push(GameEvent::ResourcesProduced { grants });
        }
    }

    // -------- dice & production --------

    fn apply_roll_dice(&mut self, actor: PlayerId, events: &mut Vec<GameEvent>) {
        let mut rng = self.next_rng();
        let die1: u8 = rng.gen_range(1..=6);
        let die2: u8 = rng.gen_range(1..=6);
        let total = die1 + die2;
        self.turn.dice_roll = Some((die1, die2));

        events.push(GameEvent::DiceRolled {
            player: actor,
            roll: [die1, die2],
            total,
        });
        self.log
            .push(format!("{} rolled {}", self.name(actor), total));

        if total == 7 {
            let pending: HashMap<PlayerId, u32> = self
                .players
                .iter()
                .filter(|p| p.resources.total() > DISCARD_THRESHOLD)
                .map(|p| (p.id, p.resources.total() / 2))
                .collect();
            if pending.is_empty() {
                self.set_sub(MainSub::MoveRobber);
            } else {
                events.push(GameEvent::DiscardsRequired {
                    pending: pending.clone(),
                });
                self.turn.pending_discards = pending;
                self.set_sub(MainSub::Discard);
            }
        } else {
            self.produce(total, events);
            self.set_sub(MainSub::TradeBuildPlay);
        }
    }

    /// Distribute production for a roll, all-or-nothing per resource when
    /// the bank cannot cover the total claims.
    fn produce(&mut self, total: u8, events: &mut Vec<GameEvent>) {
        let claims = self.board.production_claims(total);

        let mut claimed_totals: HashMap<Resource, u32> = HashMap::new();
        for per_player in claims.values() {
            for (&resource, &amount) in per_player {
                *claimed_totals.entry(resource).or_insert(0) += amount;
            }
        }

        let mut grants = Vec::new();
        for resource in Resource::ALL {
            let claimed = claimed_totals.get(&resource).copied().unwrap_or(0);
            if claimed == 0 {
                continue;
            }
            if !self.bank.has(resource, claimed) {
                let available = self.bank.stock().get(resource);
                events.push(GameEvent::ProductionShorted {
                    resource,
                    claimed,
                    available,
                });
                self.log.push(format!(
                    "Bank cannot cover {:?} claims; nobody receives any",
                    resource
                ));
                continue;
            }
            for id in 0..self.players.len() as PlayerId {
                let amount = claims
                    .get(&id)
                    .and_then(|per| per.get(&resource))
                    .copied()
                    .unwrap_or(0);
                if amount == 0 {
                    continue;
                }
                self.bank.withdraw(resource, amount);
                self.player_mut(id).resources.add(resource, amount);
                grants.push(ResourceGrant {
                    player: id,
                    resource,
                    amount,
                });
            }
        }
        if !grants.is_empty() {
            events.push(GameEvent::ResourcesProduced { grants });
        }
    }

    fn apply_discard(
        &mut self,
        actor: PlayerId,
        resources: &ResourceBundle,
        events: &mut Vec<GameEvent>,
    ) {
        self.player_mut(actor).resources.subtract(resources);
        self.bank.deposit_bundle(resources);
        self.turn.pending_discards.remove(&actor);

        events.push(GameEvent::ResourcesDiscarded {
            player: actor,
            count: resources.total(),
        });
        self.log.push(format!(
            "{} discarded {} cards",
            self.name(actor),
            resources.total()
        ));

        if self.turn.pending_discards.is_empty() {
            self.set_sub(MainSub::MoveRobber);
        }
    }

    // -------- robber --------

    /// Shared by MOVE_ROBBER and the knight: move, then resolve the steal.
    fn robber_flow(&mut self, actor: PlayerId, hex: HexCoord, events: &mut Vec<GameEvent>) {
        let from = self.board.robber();
        self.board.move_robber(hex);
        events.push(GameEvent::RobberMoved {
            player: actor,
            from,
            to: hex,
        });
        self.log
            .push(format!("{} moved the robber", self.name(actor)));

        let candidates: Vec<PlayerId> = self
            .board
            .players_on_hex(&hex)
            .into_iter()
            .filter(|&p| p != actor && self.player(p).resources.total() > 0)
            .collect();

        match candidates.len() {
            0 => {
                self.turn.must_steal_from.clear();
                self.set_sub(self.post_robber_sub());
            }
            1 => {
                self.steal(actor, candidates[0], events);
                self.turn.must_steal_from.clear();
                self.set_sub(self.post_robber_sub());
            }
            _ => {
                self.turn.must_steal_from = candidates;
                self.set_sub(MainSub::Steal);
            }
        }
    }

    /// Where the robber flow returns to: a knight played before the roll
    /// goes back to ROLL_DICE, otherwise the build phase.
    fn post_robber_sub(&self) -> MainSub {
        if self.turn.dice_roll.is_none() {
            MainSub::RollDice
        } else {
            MainSub::TradeBuildPlay
        }
    }

    fn steal(&mut self, thief: PlayerId, victim: PlayerId, events: &mut Vec<GameEvent>) {
        let mut rng = self.next_rng();
        let stolen = self.player_mut(victim).resources.draw_random(&mut rng);
        if let Some(resource) = stolen {
            self.player_mut(thief).resources.add(resource, 1);
        }
        events.push(GameEvent::ResourceStolen { thief, victim });
        // The log is visible to everyone; the card stays hidden.
        self.log.push(format!(
            "{} stole a card from {}",
            self.name(thief),
            self.name(victim)
        ));
    }

    // -------- building --------

    fn apply_build_settlement(
        &mut self,
        actor: PlayerId,
        vertex: VertexCoord,
        events: &mut Vec<GameEvent>,
    ) {
        self.pay(actor, &costs::settlement());
        self.player_mut(actor).settlements_remaining -= 1;
        self.board.place_settlement(vertex, actor);
        self.grant_port_access(actor, vertex);

        events.push(GameEvent::SettlementBuilt {
            player: actor,
            vertex,
        });
        self.log
            .push(format!("{} built a settlement", self.name(actor)));

        // A new settlement can cleave an opponent's road.
        self.refresh_longest_road(events);
    }

    fn apply_build_road(
        &mut self,
        actor: PlayerId,
        edge: EdgeCoord,
        events: &mut Vec<GameEvent>,
    ) {
        if self.turn.road_building_roads_left > 0 {
            self.turn.road_building_roads_left -= 1;
        } else {
            self.pay(actor, &costs::road());
        }
        self.player_mut(actor).roads_remaining -= 1;
        self.board.place_road(edge, actor);

        events.push(GameEvent::RoadBuilt {
            player: actor,
            edge,
        });
        self.log.push(format!("{} built a road", self.name(actor)));
        self.refresh_longest_road(events);
    }

    fn apply_build_city(
        &mut self,
        actor: PlayerId,
        vertex: VertexCoord,
        events: &mut Vec<GameEvent>,
    ) {
        self.pay(actor, &costs::city());
        let player = self.player_mut(actor);
        player.cities_remaining -= 1;
        // The settlement piece returns to the pool.
        player.settlements_remaining += 1;
        self.board.upgrade_to_city(vertex, actor);

        events.push(GameEvent::CityBuilt {
            player: actor,
            vertex,
        });
        self.log
            .push(format!("{} upgraded to a city", self.name(actor)));
    }

    /// Pay a cost into the bank.
    fn pay(&mut self, actor: PlayerId, cost: &ResourceBundle) {
        self.player_mut(actor).resources.subtract(cost);
        self.bank.deposit_bundle(cost);
    }

    fn grant_port_access(&mut self, actor: PlayerId, vertex: VertexCoord) {
        let kinds = self.board.ports_at_vertex(&vertex);
        let player = self.player_mut(actor);
        for kind in kinds {
            player.ports.insert(kind);
        }
    }

    // -------- development cards --------

    fn apply_buy_dev_card(&mut self, actor: PlayerId, events: &mut Vec<GameEvent>) {
        self.pay(actor, &costs::dev_card());
        let kind = self.dev_deck.remove(0);
        let turn = self.turn.turn_number;
        self.player_mut(actor).dev_cards.push(DevCard {
            kind,
            turn_acquired: turn,
        });
        self.turn.dev_card_bought_this_turn = true;

        events.push(GameEvent::DevCardBought { player: actor });
        self.log
            .push(format!("{} bought a development card", self.name(actor)));
    }

    fn apply_play_knight(&mut self, actor: PlayerId, hex: HexCoord, events: &mut Vec<GameEvent>) {
        let turn = self.turn.turn_number;
        self.player_mut(actor).play_dev_card(DevCardKind::Knight, turn);
        self.turn.dev_card_played_this_turn = true;

        events.push(GameEvent::KnightPlayed { player: actor });
        self.log
            .push(format!("{} played a knight", self.name(actor)));

        self.refresh_largest_army(events);
        self.robber_flow(actor, hex, events);
    }

    fn apply_play_road_building(&mut self, actor: PlayerId, events: &mut Vec<GameEvent>) {
        let turn = self.turn.turn_number;
        self.player_mut(actor)
            .play_dev_card(DevCardKind::RoadBuilding, turn);
        self.turn.dev_card_played_this_turn = true;
        self.turn.road_building_roads_left = self.player(actor).roads_remaining.min(2) as u8;

        events.push(GameEvent::RoadBuildingPlayed { player: actor });
        self.log
            .push(format!("{} played Road Building", self.name(actor)));
    }

    fn apply_year_of_plenty(
        &mut self,
        actor: PlayerId,
        resources: [Resource; 2],
        events: &mut Vec<GameEvent>,
    ) {
        let turn = self.turn.turn_number;
        self.player_mut(actor)
            .play_dev_card(DevCardKind::YearOfPlenty, turn);
        self.turn.dev_card_played_this_turn = true;

        for resource in resources {
            self.bank.withdraw(resource, 1);
            self.player_mut(actor).resources.add(resource, 1);
        }

        events.push(GameEvent::YearOfPlentyPlayed {
            player: actor,
            resources,
        });
        self.log
            .push(format!("{} played Year of Plenty", self.name(actor)));
    }

    fn apply_monopoly(&mut self, actor: PlayerId, resource: Resource, events: &mut Vec<GameEvent>) {
        let turn = self.turn.turn_number;
        self.player_mut(actor)
            .play_dev_card(DevCardKind::Monopoly, turn);
        self.turn.dev_card_played_this_turn = true;

        // Direct player-to-player transfer; the bank is untouched.
        let mut collected = 0;
        for other in &mut self.players {
            if other.id == actor {
                continue;
            }
            let held = other.resources.get(resource);
            other.resources.set(resource, 0);
            collected += held;
        }
        self.player_mut(actor).resources.add(resource, collected);

        events.push(GameEvent::MonopolyPlayed {
            player: actor,
            resource,
            collected,
        });
        self.log.push(format!(
            "{} played Monopoly and collected {}",
            self.name(actor),
            collected
        ));
    }

    // -------- trading --------

    fn apply_propose_trade(
        &mut self,
        actor: PlayerId,
        offering: ResourceBundle,
        requesting: ResourceBundle,
        events: &mut Vec<GameEvent>,
    ) {
        let id = self.next_trade_id;
        self.next_trade_id += 1;

        let responses: HashMap<PlayerId, TradeResponse> = (0..self.players.len() as PlayerId)
            .filter(|&p| p != actor)
            .map(|p| (p, TradeResponse::Pending))
            .collect();

        let offer = TradeOffer {
            id,
            proposer: actor,
            offering,
            requesting,
            responses,
            status: TradeStatus::Open,
        };
        events.push(GameEvent::TradeProposed {
            offer: offer.clone(),
        });
        self.trade_offers.push(offer);
        self.log
            .push(format!("{} proposed a trade", self.name(actor)));
    }

    fn apply_respond_to_trade(
        &mut self,
        actor: PlayerId,
        trade_id: TradeId,
        accept: bool,
        events: &mut Vec<GameEvent>,
    ) {
        let response = if accept {
            TradeResponse::Accepted
        } else {
            TradeResponse::Rejected
        };
        if let Some(offer) = self.trade_offers.iter_mut().find(|t| t.id == trade_id) {
            offer.responses.insert(actor, response);
        }
        events.push(GameEvent::TradeResponded {
            trade_id,
            player: actor,
            accept,
        });
    }

    fn apply_confirm_trade(
        &mut self,
        trade_id: TradeId,
        with_player: PlayerId,
        events: &mut Vec<GameEvent>,
    ) {
        let pos = self
            .trade_offers
            .iter()
            .position(|t| t.id == trade_id)
            .expect("validated trade id");
        let mut offer = self.trade_offers.remove(pos);
        offer.status = TradeStatus::Executed;

        let proposer = offer.proposer;
        self.player_mut(proposer).resources.subtract(&offer.offering);
        self.player_mut(proposer)
            .resources
            .add_bundle(&offer.requesting);
        self.player_mut(with_player)
            .resources
            .subtract(&offer.requesting);
        self.player_mut(with_player)
            .resources
            .add_bundle(&offer.offering);

        events.push(GameEvent::TradeExecuted {
            trade_id,
            proposer,
            with_player,
        });
        self.log.push(format!(
            "{} traded with {}",
            self.name(proposer),
            self.name(with_player)
        ));
    }

    fn apply_cancel_trade(&mut self, trade_id: TradeId, events: &mut Vec<GameEvent>) {
        self.trade_offers.retain(|t| t.id != trade_id);
        events.push(GameEvent::TradeCancelled { trade_id });
    }

    fn apply_bank_trade(
        &mut self,
        actor: PlayerId,
        giving: &ResourceBundle,
        receiving: Resource,
        events: &mut Vec<GameEvent>,
    ) {
        let (give, count) = giving.single_kind().expect("validated bank trade");
        self.player_mut(actor).resources.subtract(giving);
        self.bank.deposit_bundle(giving);
        self.bank.withdraw(receiving, 1);
        self.player_mut(actor).resources.add(receiving, 1);

        events.push(GameEvent::BankTraded {
            player: actor,
            gave: give,
            gave_count: count,
            received: receiving,
        });
        self.log.push(format!(
            "{} traded {} with the bank",
            self.name(actor),
            count
        ));
    }

    // -------- turn management --------

    fn apply_end_turn(&mut self, actor: PlayerId, events: &mut Vec<GameEvent>) {
        // Open offers from the departing player are cancelled.
        let cancelled: Vec<TradeId> = self
            .trade_offers
            .iter()
            .filter(|t| t.proposer == actor)
            .map(|t| t.id)
            .collect();
        for trade_id in cancelled {
            self.trade_offers.retain(|t| t.id != trade_id);
            events.push(GameEvent::TradeCancelled { trade_id });
        }

        self.turn.dice_roll = None;
        self.turn.dev_card_played_this_turn = false;
        self.turn.dev_card_bought_this_turn = false;
        self.turn.road_building_roads_left = 0;
        self.turn.must_steal_from.clear();

        let next = (actor + 1) % self.players.len() as PlayerId;
        self.turn.current_player = next;
        self.turn.turn_number += 1;
        self.set_sub(MainSub::RollDice);

        events.push(GameEvent::TurnEnded {
            player: actor,
            next_player: next,
        });
        self.log
            .push(format!("{} ended their turn", self.name(actor)));
    }

    // -------- awards & victory --------

    /// Recompute every player's road length and adjudicate the bonus. The
    /// holder keeps it while tied for or ahead of the new maximum, unless
    /// their own road was just cut down into that tie; a strict, unique
    /// surpasser takes it; otherwise nobody holds it.
    fn refresh_longest_road(&mut self, events: &mut Vec<GameEvent>) {
        let holder = self
            .players
            .iter()
            .find(|p| p.has_longest_road)
            .map(|p| p.id);
        // Cached length from before this placement: a cleaved holder is told
        // apart from a holder whose rivals merely caught up.
        let holder_previous = holder
            .map(|h| self.player(h).longest_road_length)
            .unwrap_or(0);

        for i in 0..self.players.len() {
            self.players[i].longest_road_length = self.board.longest_road(i as PlayerId);
        }

        let max_len = self
            .players
            .iter()
            .map(|p| p.longest_road_length)
            .max()
            .unwrap_or(0);

        let unique_at_max = || {
            if max_len < LONGEST_ROAD_MINIMUM {
                return None;
            }
            let at_max: Vec<PlayerId> = self
                .players
                .iter()
                .filter(|p| p.longest_road_length == max_len)
                .map(|p| p.id)
                .collect();
            match at_max.as_slice() {
                [single] => Some(*single),
                _ => None,
            }
        };

        let new_holder = match holder {
            Some(h) => {
                let held = self.player(h).longest_road_length;
                let shares_max = self
                    .players
                    .iter()
                    .any(|p| p.id != h && p.longest_road_length == max_len);
                if held < LONGEST_ROAD_MINIMUM || held < max_len {
                    unique_at_max()
                } else if held < holder_previous && shares_max {
                    // The holder's road dropped into a tie at the new
                    // maximum: nobody holds the bonus.
                    None
                } else {
                    Some(h)
                }
            }
            None => unique_at_max(),
        };

        if new_holder != holder {
            for player in &mut self.players {
                player.has_longest_road = Some(player.id) == new_holder;
            }
            events.push(GameEvent::LongestRoadChanged {
                previous: holder,
                current: new_holder,
                length: max_len,
            });
            self.log.push(match new_holder {
                Some(id) => format!("{} holds the longest road", self.name(id)),
                None => "Longest road is unclaimed".to_string(),
            });
        }
    }

    /// Transfer rules as for longest road, over played knights. Knight
    /// counts never decrease, so the cut-into-a-tie case cannot arise here.
    fn refresh_largest_army(&mut self, events: &mut Vec<GameEvent>) {
        let holder = self
            .players
            .iter()
            .find(|p| p.has_largest_army)
            .map(|p| p.id);
        let max_knights = self
            .players
            .iter()
            .map(|p| p.knights_played)
            .max()
            .unwrap_or(0);

        let unique_at_max = || {
            if max_knights < LARGEST_ARMY_MINIMUM {
                return None;
            }
            let at_max: Vec<PlayerId> = self
                .players
                .iter()
                .filter(|p| p.knights_played == max_knights)
                .map(|p| p.id)
                .collect();
            match at_max.as_slice() {
                [single] => Some(*single),
                _ => None,
            }
        };

        let new_holder = match holder {
            Some(h) => {
                let held = self.player(h).knights_played;
                if held >= LARGEST_ARMY_MINIMUM && held >= max_knights {
                    Some(h)
                } else {
                    unique_at_max()
                }
            }
            None => unique_at_max(),
        };

        if new_holder != holder {
            for player in &mut self.players {
                player.has_largest_army = Some(player.id) == new_holder;
            }
            events.push(GameEvent::LargestArmyChanged {
                previous: holder,
                current: new_holder,
                knights: max_knights,
            });
            self.log.push(match new_holder {
                Some(id) => format!("{} holds the largest army", self.name(id)),
                None => "Largest army is unclaimed".to_string(),
            });
        }
    }

    /// Victory is detected for the current player only; hidden VP cards mean
    /// nobody else can win on this turn even at ten points.
    fn check_victory(&mut self, events: &mut Vec<GameEvent>) {
        let current = self.turn.current_player;
        let score = self.score(current);
        if score >= VICTORY_POINTS_TO_WIN {
            self.winner = Some(current);
            self.turn.phase = Phase::GameOver;
            events.push(GameEvent::GameWon {
                player: current,
                victory_points: score,
            });
            self.log.push(format!(
                "{} wins with {} victory points",
                self.name(current),
                score
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PortKind, Terrain};
    use crate::hex::{VertexDir, Wind};
    use crate::view::GameView;
    use pretty_assertions::assert_eq;

    fn new_game(players: usize, seed: u64) -> GameState {
        let names = ["Ada", "Grace", "Edsger", "Barbara"][..players]
            .iter()
            .map(|n| n.to_string())
            .collect();
        GameState::new("test-game", names, seed)
    }

    /// Drive the whole setup phase with first-found legal placements.
    fn complete_setup(state: &mut GameState) {
        for _ in 0..64 {
            let Phase::Setup {
                setup_order,
                setup_step,
                placing,
                last_settlement,
            } = state.turn.phase.clone()
            else {
                break;
            };
            let actor = setup_order[setup_step];
            let action = match placing {
                SetupPlacing::Settlement => {
                    let vertex = geometry()
                        .vertices
                        .iter()
                        .copied()
                        .find(|v| {
                            state.board.building(v).is_none() && state.board.distance_rule_ok(v)
                        })
                        .expect("open settlement spot");
                    PlayerAction::PlaceSettlement { vertex }
                }
                SetupPlacing::Road => {
                    let vertex = last_settlement.expect("settlement before road");
                    let edge = geometry().vertex_edges[&vertex]
                        .iter()
                        .copied()
                        .find(|e| state.board.road_owner(e).is_none())
                        .expect("open road spot");
                    PlayerAction::PlaceRoad { edge }
                }
            };
            let (next, _) = state.dispatch(actor, &action).expect("setup placement");
            *state = next;
        }
        assert!(matches!(state.turn.phase, Phase::Main { .. }));
    }

    /// A main-phase state without the setup ceremony: empty board, player 0
    /// to act in the build phase of turn `turn`.
    fn build_phase_state(players: usize, turn: u32) -> GameState {
        let mut state = new_game(players, 9);
        state.turn.phase = Phase::Main {
            sub: MainSub::TradeBuildPlay,
        };
        state.turn.current_player = 0;
        state.turn.turn_number = turn;
        state.turn.dice_roll = Some((3, 4));
        state
    }

    fn snapshot(state: &GameState) -> serde_json::Value {
        serde_json::to_value(GameView::for_player(state, 0)).unwrap()
    }

    /// Grow a road chain for `player` by dispatching PLACE_ROAD from the tip,
    /// starting at the player's settlement vertex. Returns the vertices
    /// traversed.
    fn grow_chain(
        state: &mut GameState,
        player: PlayerId,
        start: VertexCoord,
        roads: usize,
    ) -> Vec<VertexCoord> {
        let mut tip = start;
        let mut path = vec![start];
        for _ in 0..roads {
            let mut options: Vec<EdgeCoord> = geometry().vertex_edges[&tip]
                .iter()
                .copied()
                .filter(|e| state.board.road_owner(e).is_none())
                .collect();
            options.sort();
            let edge = options[0];
            let (next, _) = state
                .dispatch(player, &PlayerAction::PlaceRoad { edge })
                .expect("chain road");
            *state = next;
            let [a, b] = edge.endpoints();
            tip = if a == tip { b } else { a };
            path.push(tip);
        }
        path
    }

    #[test]
    fn new_game_starts_in_setup_snake_order() {
        let state = new_game(4, 0);
        let Phase::Setup {
            setup_order,
            setup_step,
            placing,
            ..
        } = &state.turn.phase
        else {
            panic!("expected setup");
        };
        assert_eq!(setup_order, &vec![0, 1, 2, 3, 3, 2, 1, 0]);
        assert_eq!(*setup_step, 0);
        assert_eq!(*placing, SetupPlacing::Settlement);
        assert_eq!(state.dev_deck.len(), 25);
        assert_eq!(state.turn.turn_number, 0);
    }

    #[test]
    fn same_seed_replays_identically() {
        let mut a = new_game(3, 123);
        let mut b = new_game(3, 123);
        complete_setup(&mut a);
        complete_setup(&mut b);
        for viewer in 0..3 {
            assert_eq!(
                serde_json::to_value(GameView::for_player(&a, viewer)).unwrap(),
                serde_json::to_value(GameView::for_player(&b, viewer)).unwrap()
            );
        }
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn dispatch_rejects_without_observable_effect() {
        let state = new_game(3, 5);
        let before = snapshot(&state);

        // Wrong player entirely.
        let err = state.dispatch(1, &PlayerAction::RollDice).unwrap_err();
        assert_eq!(err, GameError::NotYourTurn);

        // Right player, wrong phase.
        let err = state.dispatch(0, &PlayerAction::RollDice).unwrap_err();
        assert_eq!(err, GameError::WrongPhase);

        assert_eq!(before, snapshot(&state));
    }

    #[test]
    fn setup_settlement_distance_rule() {
        let mut state = new_game(3, 0);
        let v0 = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        let (next, _) = state
            .dispatch(0, &PlayerAction::PlaceSettlement { vertex: v0 })
            .unwrap();
        state = next;

        // Road to finish player 0's step.
        let edge = EdgeCoord::new(HexCoord::new(0, 0), Wind::NE);
        let (next, _) = state.dispatch(0, &PlayerAction::PlaceRoad { edge }).unwrap();
        state = next;

        // One edge away: rejected by the distance rule.
        let too_close = VertexCoord::new(HexCoord::new(1, -1), VertexDir::S);
        let err = state
            .dispatch(1, &PlayerAction::PlaceSettlement { vertex: too_close })
            .unwrap_err();
        assert_eq!(err, GameError::DistanceRule);
        assert!(err.to_string().contains("distance rule"));

        // Two edges away: fine.
        let two_away = VertexCoord::new(HexCoord::new(1, 0), VertexDir::N);
        assert!(state
            .dispatch(1, &PlayerAction::PlaceSettlement { vertex: two_away })
            .is_ok());
    }

    #[test]
    fn setup_road_must_touch_last_settlement() {
        let state = new_game(3, 0);
        let v0 = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        let (state, _) = state
            .dispatch(0, &PlayerAction::PlaceSettlement { vertex: v0 })
            .unwrap();

        let detached = EdgeCoord::new(HexCoord::new(-2, 2), Wind::SW);
        let err = state
            .dispatch(0, &PlayerAction::PlaceRoad { edge: detached })
            .unwrap_err();
        assert_eq!(err, GameError::SetupRoadDetached);
    }

    #[test]
    fn setup_grants_second_round_starting_resources() {
        let mut total_handed_out = 0;
        for seed in 0..5 {
            let mut state = new_game(2, seed);
            complete_setup(&mut state);

            // Second settlements pay out one resource per adjacent
            // non-desert hex, drawn from the bank.
            let handed_out: u32 = state.players.iter().map(|p| p.resources.total()).sum();
            let banked: u32 = Resource::ALL
                .iter()
                .map(|&r| state.bank.stock().get(r))
                .sum();
            assert_eq!(handed_out + banked, 5 * Bank::INITIAL_PER_RESOURCE);
            total_handed_out += handed_out;

            assert_eq!(state.turn.turn_number, 1);
            assert_eq!(state.turn.current_player, 0);
            assert!(matches!(
                state.turn.phase,
                Phase::Main {
                    sub: MainSub::RollDice
                }
            ));
            for player in &state.players {
                assert_eq!(player.settlements_remaining, 3);
                assert_eq!(player.roads_remaining, 13);
            }
        }
        assert!(total_handed_out > 0, "second settlements border land");
    }

    #[test]
    fn seven_roll_computes_pending_discards() {
        // Dice come from the seed, so scan seeds for a first-roll seven.
        for seed in 0..200 {
            let mut state = new_game(2, seed);
            complete_setup(&mut state);
            state.players[0].resources = ResourceBundle::with_amounts(3, 3, 2, 0, 0);
            state.players[1].resources = ResourceBundle::new();

            let (next, _) = state.dispatch(0, &PlayerAction::RollDice).unwrap();
            let (d1, d2) = next.turn.dice_roll.unwrap();
            if d1 + d2 != 7 {
                continue;
            }

            assert_eq!(next.turn.pending_discards.get(&0), Some(&4));
            assert_eq!(next.turn.pending_discards.get(&1), None);
            assert!(matches!(
                next.turn.phase,
                Phase::Main {
                    sub: MainSub::Discard
                }
            ));

            // Short discard rejected, exact discard accepted.
            let short = PlayerAction::DiscardResources {
                resources: ResourceBundle::with_amounts(3, 0, 0, 0, 0),
            };
            assert_eq!(
                next.dispatch(0, &short).unwrap_err(),
                GameError::WrongDiscardCount(4)
            );

            let exact = PlayerAction::DiscardResources {
                resources: ResourceBundle::with_amounts(2, 2, 0, 0, 0),
            };
            let (after, _) = next.dispatch(0, &exact).unwrap();
            assert!(after.turn.pending_discards.is_empty());
            assert!(matches!(
                after.turn.phase,
                Phase::Main {
                    sub: MainSub::MoveRobber
                }
            ));
            assert_eq!(after.players[0].resources.total(), 4);
            return;
        }
        panic!("no seed in range rolled a seven first");
    }

    #[test]
    fn robber_must_move_to_a_different_hex() {
        let mut state = build_phase_state(2, 1);
        state.turn.phase = Phase::Main {
            sub: MainSub::MoveRobber,
        };
        let err = state
            .dispatch(
                0,
                &PlayerAction::MoveRobber {
                    hex: state.board.robber(),
                },
            )
            .unwrap_err();
        assert_eq!(err, GameError::RobberMustMove);
        assert!(err.to_string().contains("different hex"));
    }

    #[test]
    fn robber_steal_takes_one_card() {
        let mut state = build_phase_state(2, 1);
        state.turn.phase = Phase::Main {
            sub: MainSub::MoveRobber,
        };
        // Put player 1 on a corner of a known hex with one card.
        let target_hex = geometry()
            .hexes
            .iter()
            .copied()
            .find(|h| *h != state.board.robber())
            .unwrap();
        let vertex = geometry().hex_vertices[&target_hex][0];
        state.board.place_settlement(vertex, 1);
        state.players[1].resources = ResourceBundle::single(Resource::Sheep, 1);

        let (next, events) = state
            .dispatch(0, &PlayerAction::MoveRobber { hex: target_hex })
            .unwrap();
        // Single candidate: stolen automatically, straight to the build phase.
        assert_eq!(next.players[0].resources.get(Resource::Sheep), 1);
        assert_eq!(next.players[1].resources.total(), 0);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::ResourceStolen { thief: 0, victim: 1 })));
        assert!(matches!(
            next.turn.phase,
            Phase::Main {
                sub: MainSub::TradeBuildPlay
            }
        ));
    }

    #[test]
    fn knight_before_roll_returns_to_roll_dice() {
        let mut state = build_phase_state(2, 2);
        state.turn.phase = Phase::Main {
            sub: MainSub::RollDice,
        };
        state.turn.dice_roll = None;
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::Knight,
            turn_acquired: 1,
        });

        let target = geometry()
            .hexes
            .iter()
            .copied()
            .find(|h| *h != state.board.robber())
            .unwrap();
        let (next, _) = state
            .dispatch(0, &PlayerAction::PlayKnight { robber_hex: target })
            .unwrap();

        // Nothing to steal; the player still owes a dice roll.
        assert!(matches!(
            next.turn.phase,
            Phase::Main {
                sub: MainSub::RollDice
            }
        ));
        assert_eq!(next.board.robber(), target);
        assert_eq!(next.players[0].knights_played, 1);
        assert!(next.turn.dev_card_played_this_turn);

        let (after_roll, _) = next.dispatch(0, &PlayerAction::RollDice).unwrap();
        assert!(after_roll.turn.dice_roll.is_some());
    }

    #[test]
    fn dev_card_unplayable_on_purchase_turn() {
        let mut state = build_phase_state(2, 3);
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::Knight,
            turn_acquired: 3,
        });
        let target = geometry()
            .hexes
            .iter()
            .copied()
            .find(|h| *h != state.board.robber())
            .unwrap();
        let err = state
            .dispatch(0, &PlayerAction::PlayKnight { robber_hex: target })
            .unwrap_err();
        assert_eq!(err, GameError::NoPlayableCard);
    }

    #[test]
    fn one_dev_card_per_turn() {
        let mut state = build_phase_state(3, 4);
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::Monopoly,
            turn_acquired: 1,
        });
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::YearOfPlenty,
            turn_acquired: 1,
        });

        let (next, _) = state
            .dispatch(
                0,
                &PlayerAction::PlayMonopoly {
                    resource: Resource::Ore,
                },
            )
            .unwrap();
        let err = next
            .dispatch(
                0,
                &PlayerAction::PlayYearOfPlenty {
                    resources: [Resource::Wood, Resource::Brick],
                },
            )
            .unwrap_err();
        assert_eq!(err, GameError::DevCardAlreadyPlayed);
    }

    #[test]
    fn monopoly_collects_from_every_player() {
        let mut state = build_phase_state(4, 2);
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::Monopoly,
            turn_acquired: 1,
        });
        state.players[1].resources.add(Resource::Wheat, 2);
        state.players[2].resources.add(Resource::Wheat, 3);
        // Player 3 holds none.
        let bank_before = *state.bank.stock();

        let (next, events) = state
            .dispatch(
                0,
                &PlayerAction::PlayMonopoly {
                    resource: Resource::Wheat,
                },
            )
            .unwrap();

        assert_eq!(next.players[0].resources.get(Resource::Wheat), 5);
        for other in 1..4 {
            assert_eq!(next.players[other].resources.get(Resource::Wheat), 0);
        }
        assert_eq!(next.bank.stock(), &bank_before, "monopoly skips the bank");
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::MonopolyPlayed {
                collected: 5,
                resource: Resource::Wheat,
                ..
            }
        )));
        assert!(next.log.iter().any(|line| line.contains("collected 5")));
    }

    #[test]
    fn year_of_plenty_needs_bank_stock() {
        let mut state = build_phase_state(2, 2);
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::YearOfPlenty,
            turn_acquired: 1,
        });
        // Drain ore to one card: asking for two must fail.
        state.bank.withdraw(Resource::Ore, 18);
        let err = state
            .dispatch(
                0,
                &PlayerAction::PlayYearOfPlenty {
                    resources: [Resource::Ore, Resource::Ore],
                },
            )
            .unwrap_err();
        assert_eq!(err, GameError::BankShort);

        let (next, _) = state
            .dispatch(
                0,
                &PlayerAction::PlayYearOfPlenty {
                    resources: [Resource::Ore, Resource::Wood],
                },
            )
            .unwrap();
        assert_eq!(next.players[0].resources.get(Resource::Ore), 1);
        assert_eq!(next.players[0].resources.get(Resource::Wood), 1);
        assert!(!next.bank.has(Resource::Ore, 1));
    }

    #[test]
    fn road_building_with_one_piece_left() {
        let mut state = build_phase_state(2, 2);
        let vertex = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        state.board.place_settlement(vertex, 0);
        state.players[0].dev_cards.push(DevCard {
            kind: DevCardKind::RoadBuilding,
            turn_acquired: 1,
        });
        state.players[0].roads_remaining = 1;

        let (mut next, _) = state.dispatch(0, &PlayerAction::PlayRoadBuilding).unwrap();
        assert_eq!(next.turn.road_building_roads_left, 1);

        // The single free road costs nothing and clears the counter.
        assert!(next.players[0].resources.is_empty());
        grow_chain(&mut next, 0, vertex, 1);
        assert_eq!(next.turn.road_building_roads_left, 0);
        assert_eq!(next.players[0].roads_remaining, 0);

        // No pieces left at all now.
        let edge = geometry().vertex_edges[&vertex]
            .iter()
            .copied()
            .find(|e| next.board.road_owner(e).is_none())
            .unwrap();
        assert_eq!(
            next.dispatch(0, &PlayerAction::PlaceRoad { edge }).unwrap_err(),
            GameError::NoPiecesRemaining("road")
        );
    }

    #[test]
    fn bank_scarcity_is_all_or_nothing_per_resource() {
        let mut state = build_phase_state(3, 2);
        // A wheat hex with two cities of player 0 and a settlement of
        // player 1: five wheat claimed. The tile must not sit next to
        // another wheat tile with the same token, or the claim count would
        // drift.
        let geo = geometry();
        let tile = state
            .board
            .tiles()
            .find(|t| {
                t.terrain == Terrain::Fields
                    && t.token.is_some()
                    && geo.hex_vertices[&t.coord].iter().all(|corner| {
                        geo.vertex_hexes[corner].iter().all(|h| {
                            *h == t.coord
                                || state.board.tile(h).is_none_or(|o| {
                                    o.token != t.token || o.terrain != Terrain::Fields
                                })
                        })
                    })
            })
            .cloned()
            .unwrap();
        let roll = tile.token.unwrap();
        let corners = geometry().hex_vertices[&tile.coord];
        state.board.place_settlement(corners[0], 0);
        state.board.upgrade_to_city(corners[0], 0);
        state.board.place_settlement(corners[2], 0);
        state.board.upgrade_to_city(corners[2], 0);
        state.board.place_settlement(corners[4], 1);

        // Bank holds a single wheat: 5 > 1, so nobody is paid.
        state.bank.withdraw(Resource::Wheat, 18);
        let mut events = Vec::new();
        state.produce(roll, &mut events);
        assert_eq!(state.players[0].resources.get(Resource::Wheat), 0);
        assert_eq!(state.players[1].resources.get(Resource::Wheat), 0);
        assert!(state.bank.has(Resource::Wheat, 1));
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::ProductionShorted {
                resource: Resource::Wheat,
                claimed: 5,
                available: 1,
            }
        )));

        // Exactly enough: every claimant is paid in full.
        state.bank.deposit(Resource::Wheat, 4);
        let mut events = Vec::new();
        state.produce(roll, &mut events);
        assert_eq!(state.players[0].resources.get(Resource::Wheat), 4);
        assert_eq!(state.players[1].resources.get(Resource::Wheat), 1);
        assert!(!state.bank.has(Resource::Wheat, 1));
    }

    #[test]
    fn longest_road_awarded_and_transferred() {
        let mut state = build_phase_state(2, 2);
        // Player 0 builds from the center toward the north; player 1 from
        // the south coast. The greedy chains never meet.
        let start0 = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        let start1 = VertexCoord::new(HexCoord::new(0, 2), VertexDir::S);
        state.board.place_settlement(start0, 0);
        state.board.place_settlement(start1, 1);
        state.players[0].resources = ResourceBundle::with_amounts(20, 20, 0, 0, 0);
        state.players[1].resources = ResourceBundle::with_amounts(20, 20, 0, 0, 0);

        // Four roads: below the threshold.
        grow_chain(&mut state, 0, start0, 4);
        assert_eq!(state.players[0].longest_road_length, 4);
        assert!(!state.players[0].has_longest_road);

        // Fifth road claims the bonus.
        let tip0 = chain_tip(&state, start0);
        grow_chain(&mut state, 0, tip0, 1);
        assert_eq!(state.players[0].longest_road_length, 5);
        assert!(state.players[0].has_longest_road);

        // Player 1 matches five: a tie does not transfer.
        state.turn.current_player = 1;
        grow_chain(&mut state, 1, start1, 5);
        assert_eq!(state.players[1].longest_road_length, 5);
        assert!(state.players[0].has_longest_road);
        assert!(!state.players[1].has_longest_road);

        // Player 1 surpasses: the bonus transfers.
        let tip1 = chain_tip(&state, start1);
        grow_chain(&mut state, 1, tip1, 1);
        assert_eq!(state.players[1].longest_road_length, 6);
        assert!(!state.players[0].has_longest_road);
        assert!(state.players[1].has_longest_road);
    }

    #[test]
    fn holder_cleaved_into_tie_loses_bonus_to_nobody() {
        let mut state = build_phase_state(2, 2);
        let start0 = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        let start1 = VertexCoord::new(HexCoord::new(0, 2), VertexDir::S);
        state.board.place_settlement(start0, 0);
        state.board.place_settlement(start1, 1);
        state.players[0].resources = ResourceBundle::with_amounts(20, 20, 20, 20, 0);
        state.players[1].resources = ResourceBundle::with_amounts(20, 20, 20, 20, 0);

        // Player 0 holds the bonus at seven; player 1 sits at five.
        let path = grow_chain(&mut state, 0, start0, 7);
        assert!(state.players[0].has_longest_road);
        state.turn.current_player = 1;
        grow_chain(&mut state, 1, start1, 5);
        assert_eq!(state.players[1].longest_road_length, 5);
        assert!(state.players[0].has_longest_road, "seven beats five");

        // An enemy settlement cleaves player 0's chain into 2 + 5, tying
        // player 1 at the new maximum. The next placement re-adjudicates:
        // a holder whose own road dropped into the tie keeps nothing, and
        // the tie transfers to nobody.
        state.board.place_settlement(path[2], 1);
        let tip1 = chain_tip(&state, start1);
        let (next, events) = state
            .dispatch(1, &PlayerAction::PlaceSettlement { vertex: tip1 })
            .unwrap();

        assert_eq!(next.players[0].longest_road_length, 5);
        assert_eq!(next.players[1].longest_road_length, 5);
        assert!(!next.players[0].has_longest_road);
        assert!(!next.players[1].has_longest_road);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::LongestRoadChanged {
                previous: Some(0),
                current: None,
                length: 5,
            }
        )));
    }

    /// Follow player roads from `start` to the far end of the chain.
    fn chain_tip(state: &GameState, start: VertexCoord) -> VertexCoord {
        let mut tip = start;
        let mut prev: Option<EdgeCoord> = None;
        loop {
            let next = geometry().vertex_edges[&tip]
                .iter()
                .copied()
                .find(|e| Some(*e) != prev && state.board.road_owner(e).is_some());
            match next {
                Some(edge) => {
                    let [a, b] = edge.endpoints();
                    tip = if a == tip { b } else { a };
                    prev = Some(edge);
                }
                None => return tip,
            }
        }
    }

    #[test]
    fn largest_army_needs_three_knights() {
        let mut state = build_phase_state(2, 5);
        for turn in 1..=3 {
            state.players[0].dev_cards.push(DevCard {
                kind: DevCardKind::Knight,
                turn_acquired: turn,
            });
        }
        let robber_targets: Vec<HexCoord> = geometry().hexes.clone();

        for play in 0..3 {
            state.turn.dev_card_played_this_turn = false;
            let target = robber_targets
                .iter()
                .copied()
                .find(|h| *h != state.board.robber())
                .unwrap();
            let (next, _) = state
                .dispatch(0, &PlayerAction::PlayKnight { robber_hex: target })
                .unwrap();
            state = next;
            let expect_award = play == 2;
            assert_eq!(state.players[0].has_largest_army, expect_award);
        }
        assert_eq!(state.players[0].knights_played, 3);
    }

    #[test]
    fn bank_trade_rates() {
        let mut state = build_phase_state(2, 2);
        state.players[0].resources = ResourceBundle::single(Resource::Wood, 4);

        // 4:1 with no ports.
        let wrong_rate = PlayerAction::BankTrade {
            giving: ResourceBundle::single(Resource::Wood, 3),
            receiving: Resource::Ore,
        };
        assert_eq!(
            state.dispatch(0, &wrong_rate).unwrap_err(),
            GameError::BadBankTrade
        );

        let four_to_one = PlayerAction::BankTrade {
            giving: ResourceBundle::single(Resource::Wood, 4),
            receiving: Resource::Ore,
        };
        let (next, _) = state.dispatch(0, &four_to_one).unwrap();
        assert_eq!(next.players[0].resources.get(Resource::Wood), 0);
        assert_eq!(next.players[0].resources.get(Resource::Ore), 1);
        assert_eq!(next.bank.stock().get(Resource::Wood), 23);
        assert_eq!(next.bank.stock().get(Resource::Ore), 18);

        // 3:1 with a generic port, 2:1 with the matching port.
        state.players[0].ports.insert(PortKind::Generic);
        state.players[0].resources = ResourceBundle::single(Resource::Wood, 3);
        let three_to_one = PlayerAction::BankTrade {
            giving: ResourceBundle::single(Resource::Wood, 3),
            receiving: Resource::Sheep,
        };
        assert!(state.dispatch(0, &three_to_one).is_ok());

        state.players[0].ports.insert(PortKind::Wood);
        let two_to_one = PlayerAction::BankTrade {
            giving: ResourceBundle::single(Resource::Wood, 2),
            receiving: Resource::Sheep,
        };
        state.players[0].resources = ResourceBundle::single(Resource::Wood, 2);
        assert!(state.dispatch(0, &two_to_one).is_ok());
    }

    #[test]
    fn player_trade_full_cycle() {
        let mut state = build_phase_state(3, 2);
        state.players[0].resources = ResourceBundle::single(Resource::Wood, 2);
        state.players[1].resources = ResourceBundle::single(Resource::Ore, 1);

        let offering = ResourceBundle::single(Resource::Wood, 2);
        let requesting = ResourceBundle::single(Resource::Ore, 1);
        let (state, _) = state
            .dispatch(0, &PlayerAction::ProposeTrade { offering, requesting })
            .unwrap();
        let trade_id = state.trade_offers[0].id;
        assert_eq!(
            state.trade_offers[0].responses.get(&1),
            Some(&TradeResponse::Pending)
        );

        // The proposer cannot respond to their own offer.
        assert_eq!(
            state
                .dispatch(0, &PlayerAction::RespondToTrade { trade_id, accept: true })
                .unwrap_err(),
            GameError::OwnOffer
        );

        let (state, _) = state
            .dispatch(1, &PlayerAction::RespondToTrade { trade_id, accept: true })
            .unwrap();
        let (state, _) = state
            .dispatch(2, &PlayerAction::RespondToTrade { trade_id, accept: false })
            .unwrap();

        // Confirming with the rejector fails; with the acceptor it executes.
        assert_eq!(
            state
                .dispatch(
                    0,
                    &PlayerAction::ConfirmTrade {
                        trade_id,
                        with_player_id: 2
                    }
                )
                .unwrap_err(),
            GameError::NotAccepted
        );

        let (state, events) = state
            .dispatch(
                0,
                &PlayerAction::ConfirmTrade {
                    trade_id,
                    with_player_id: 1,
                },
            )
            .unwrap();
        assert_eq!(state.players[0].resources.get(Resource::Ore), 1);
        assert_eq!(state.players[0].resources.get(Resource::Wood), 0);
        assert_eq!(state.players[1].resources.get(Resource::Wood), 2);
        assert!(state.trade_offers.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TradeExecuted { .. })));

        // The executed offer is gone.
        assert_eq!(
            state
                .dispatch(1, &PlayerAction::RespondToTrade { trade_id, accept: true })
                .unwrap_err(),
            GameError::UnknownTrade
        );
    }

    #[test]
    fn propose_then_cancel_restores_holdings() {
        let mut state = build_phase_state(2, 2);
        state.players[0].resources = ResourceBundle::single(Resource::Brick, 3);
        let before = snapshot(&state);

        let (mid, _) = state
            .dispatch(
                0,
                &PlayerAction::ProposeTrade {
                    offering: ResourceBundle::single(Resource::Brick, 2),
                    requesting: ResourceBundle::single(Resource::Wheat, 1),
                },
            )
            .unwrap();
        let trade_id = mid.trade_offers[0].id;
        let (after, _) = mid
            .dispatch(0, &PlayerAction::CancelTrade { trade_id })
            .unwrap();

        // Holdings identical; only the log moved.
        assert_eq!(
            before["players"][0]["resources"],
            snapshot(&after)["players"][0]["resources"]
        );
        assert!(after.trade_offers.is_empty());
    }

    #[test]
    fn end_turn_resets_and_cancels_open_trades() {
        let mut state = build_phase_state(3, 4);
        state.players[0].resources = ResourceBundle::single(Resource::Wood, 1);
        state.turn.road_building_roads_left = 1;
        state.turn.dev_card_played_this_turn = true;

        let (state, _) = state
            .dispatch(
                0,
                &PlayerAction::ProposeTrade {
                    offering: ResourceBundle::single(Resource::Wood, 1),
                    requesting: ResourceBundle::single(Resource::Ore, 1),
                },
            )
            .unwrap();
        let (next, events) = state.dispatch(0, &PlayerAction::EndTurn).unwrap();

        assert!(next.trade_offers.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TradeCancelled { .. })));
        assert_eq!(next.turn.current_player, 1);
        assert_eq!(next.turn.turn_number, 5);
        assert_eq!(next.turn.dice_roll, None);
        assert_eq!(next.turn.road_building_roads_left, 0);
        assert!(!next.turn.dev_card_played_this_turn);
        assert!(matches!(
            next.turn.phase,
            Phase::Main {
                sub: MainSub::RollDice
            }
        ));
    }

    #[test]
    fn buying_dev_card_stamps_turn_and_draws_top() {
        let mut state = build_phase_state(2, 6);
        state.players[0].resources = costs::dev_card();
        let top = state.dev_deck[0];

        let (next, _) = state.dispatch(0, &PlayerAction::BuyDevCard).unwrap();
        assert_eq!(next.dev_deck.len(), 24);
        let card = next.players[0].dev_cards.last().unwrap();
        assert_eq!(card.kind, top);
        assert_eq!(card.turn_acquired, 6);
        assert!(next.turn.dev_card_bought_this_turn);
        assert!(next.players[0].resources.is_empty());
    }

    #[test]
    fn city_upgrade_swaps_pieces() {
        let mut state = build_phase_state(2, 2);
        let vertex = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        state.board.place_settlement(vertex, 0);
        state.players[0].settlements_remaining = 4;
        state.players[0].resources = costs::city();

        let (next, _) = state
            .dispatch(0, &PlayerAction::PlaceCity { vertex })
            .unwrap();
        assert_eq!(next.players[0].cities_remaining, 3);
        assert_eq!(next.players[0].settlements_remaining, 5);
        assert_eq!(
            next.board.building(&vertex).unwrap().kind,
            BuildingKind::City
        );
        assert_eq!(next.board.city_count(0), 1);
        assert_eq!(next.board.settlement_count(0), 0);
    }

    #[test]
    fn current_player_wins_at_ten_points() {
        let mut state = build_phase_state(2, 2);
        // Three settlements and three cities on mutually distant vertices:
        // nine points on the board.
        let settlements = [
            VertexCoord::new(HexCoord::new(-2, 0), VertexDir::N),
            VertexCoord::new(HexCoord::new(-2, 2), VertexDir::N),
            VertexCoord::new(HexCoord::new(2, -2), VertexDir::N),
        ];
        let cities = [
            VertexCoord::new(HexCoord::new(2, 0), VertexDir::N),
            VertexCoord::new(HexCoord::new(-2, 2), VertexDir::S),
            VertexCoord::new(HexCoord::new(2, -2), VertexDir::S),
        ];
        for v in settlements {
            state.board.place_settlement(v, 0);
        }
        for v in cities {
            state.board.place_settlement(v, 0);
            state.board.upgrade_to_city(v, 0);
        }
        assert_eq!(state.score(0), 9);

        // The tenth point: a dispatched settlement at the center.
        let target = VertexCoord::new(HexCoord::new(0, 0), VertexDir::N);
        state
            .board
            .place_road(EdgeCoord::new(HexCoord::new(0, 0), Wind::NE), 0);
        state.players[0].resources = costs::settlement();

        let (next, events) = state
            .dispatch(0, &PlayerAction::PlaceSettlement { vertex: target })
            .unwrap();
        assert_eq!(next.winner, Some(0));
        assert!(matches!(next.turn.phase, Phase::GameOver));
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::GameWon {
                player: 0,
                victory_points: 10
            }
        )));

        // Everything is rejected once the game is over.
        assert_eq!(
            next.dispatch(0, &PlayerAction::EndTurn).unwrap_err(),
            GameError::GameOver
        );
    }

    #[test]
    fn hidden_vp_cards_count_toward_victory() {
        let mut state = build_phase_state(2, 2);
        let cities = [
            VertexCoord::new(HexCoord::new(2, 0), VertexDir::N),
            VertexCoord::new(HexCoord::new(-2, 2), VertexDir::S),
            VertexCoord::new(HexCoord::new(2, -2), VertexDir::S),
            VertexCoord::new(HexCoord::new(-2, 0), VertexDir::N),
        ];
        for v in cities {
            state.board.place_settlement(v, 0);
            state.board.upgrade_to_city(v, 0);
        }
        for _ in 0..2 {
            state.players[0].dev_cards.push(DevCard {
                kind: DevCardKind::VictoryPoint,
                turn_acquired: 1,
            });
        }
        assert_eq!(state.score(0), 10);
        assert_eq!(state.public_score(0), 8);

        // Any main-phase transition on the player's own turn triggers the
        // check.
        state.players[0].resources = ResourceBundle::single(Resource::Wood, 1);
        let (next, _) = state
            .dispatch(
                0,
                &PlayerAction::ProposeTrade {
                    offering: ResourceBundle::single(Resource::Wood, 1),
                    requesting: ResourceBundle::single(Resource::Ore, 1),
                },
            )
            .unwrap();
        assert_eq!(next.winner, Some(0));
        assert!(matches!(next.turn.phase, Phase::GameOver));
    }
}
