use chrono::Utc;
use pretty_assertions::assert_eq;
use snakeladder_server::game::types::*;

fn lobby(ids: &[&str]) -> Lobby {
    let players = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut p = Player::new(id.to_string(), id.to_uppercase(), player_color(i));
            p.ready = true;
            p.is_host = i == 0;
            p
        })
        .collect();
    Lobby {
        code: LobbyCode::parse("ABC123").unwrap(),
        host_id: ids[0].to_string(),
        max_players: 6,
        players,
        status: LobbyStatus::Playing,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn game(ids: &[&str], turn: usize) -> GameState {
    let mut g = GameState::from_lobby(&lobby(ids)).unwrap();
    g.set_turn(turn);
    g
}

fn ids(g: &GameState) -> Vec<&str> {
    g.players.iter().map(|p| p.id.as_str()).collect()
}

#[test]
fn lobby_codes_are_normalised() {
    assert_eq!(LobbyCode::parse(" ab12cd ").unwrap().as_str(), "AB12CD");
    assert_eq!(
        LobbyCode::parse("ABC"),
        Err(LobbyCodeError::InvalidLength {
            expected: 6,
            found: 3
        })
    );
    assert_eq!(
        LobbyCode::parse("ABC-12"),
        Err(LobbyCodeError::InvalidCharacter { ch: '-', index: 3 })
    );
    let generated = LobbyCode::generate();
    assert_eq!(LobbyCode::parse(generated.as_str()), Ok(generated));
}

#[test]
fn game_starts_from_join_order() {
    let g = game(&["a", "b", "c"], 0);
    assert_eq!(ids(&g), vec!["a", "b", "c"]);
    assert_eq!(g.current_turn_player_id, "a");
    assert_eq!(g.host_id, "a");
    assert!(g.players.iter().all(|p| p.position == 0));
    assert_eq!(g.status, GameStatus::Playing);
}

#[test]
fn turn_cycles_with_roster_length() {
    for n in 2..=6 {
        let names: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut g = game(&refs, 0);
        for _ in 0..n {
            g.advance_turn();
        }
        assert_eq!(g.current_turn_index, 0, "{n} players");
        assert_eq!(g.current_turn_player_id, "p0");
    }
}

#[test]
fn on_turn_departure_hands_slot_to_next_occupant() {
    // B (index 1) holds the turn and leaves.
    let mut g = game(&["a", "b", "c"], 1);
    g.dice_value = Some(4);
    g.is_rolling = true;

    let next = g.without_player("b").unwrap();
    assert_eq!(ids(&next), vec!["a", "c"]);
    assert_eq!(next.current_turn_index, 1);
    assert_eq!(next.current_turn_player_id, "c");
    assert_eq!(next.dice_value, None);
    assert!(!next.is_rolling);
}

#[test]
fn off_turn_departure_keeps_turn_holder() {
    // C (index 2) holds the turn, A leaves.
    let g = game(&["a", "b", "c"], 2);

    let next = g.without_player("a").unwrap();
    assert_eq!(ids(&next), vec!["b", "c"]);
    assert_eq!(next.current_turn_index, 1);
    assert_eq!(next.current_turn_player_id, "c");
}

#[test]
fn last_slot_departure_wraps_to_front() {
    let g = game(&["a", "b", "c"], 2);
    let next = g.without_player("c").unwrap();
    assert_eq!(next.current_turn_index, 0);
    assert_eq!(next.current_turn_player_id, "a");
}

#[test]
fn departing_host_promotes_first_remaining() {
    let g = game(&["a", "b", "c"], 1);
    let next = g.without_player("a").unwrap();
    assert_eq!(next.host_id, "b");
    assert!(next.players[0].is_host);
    assert!(!next.players[1].is_host);
    assert_eq!(next.current_turn_player_id, "b");
}

#[test]
fn departure_of_stranger_or_last_player() {
    let g = game(&["a", "b"], 0);
    assert!(g.without_player("zed").is_none());

    let solo = g.without_player("b").unwrap();
    assert!(solo.without_player("a").is_none());
}

#[test]
fn standings_are_stable_on_ties() {
    let mut g = game(&["a", "b", "c", "d"], 0);
    g.players[0].position = 10;
    g.players[1].position = 30;
    g.players[2].position = 10;
    g.players[3].position = 55;

    let order: Vec<&str> = g.standings().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(order, vec!["d", "b", "a", "c"]);
}

#[test]
fn reset_keeps_roster() {
    let mut g = game(&["a", "b"], 1);
    g.players[1].position = FINISH_CELL;
    g.status = GameStatus::Won;
    g.winner_id = Some("b".into());

    g.reset();
    assert_eq!(ids(&g), vec!["a", "b"]);
    assert_eq!(g.current_turn_index, 0);
    assert_eq!(g.winner_id, None);
    assert!(g.players.iter().all(|p| p.position == 0));
}

const FINISH_CELL: u8 = snakeladder_server::game::board::FINISH;

#[test]
fn wire_shape_is_camel_case() {
    let g = game(&["a", "b"], 0);
    let json = serde_json::to_value(&g).unwrap();
    assert_eq!(json["currentTurnIndex"], 0);
    assert_eq!(json["currentTurnPlayerId"], "a");
    assert_eq!(json["status"], "playing");
    assert!(json.get("winnerId").is_none());
    assert!(json.get("diceValue").is_none());
    assert_eq!(json["players"][1]["color"], PLAYER_COLORS[1]);
}
