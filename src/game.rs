//! Starting, saving and quitting games; RC files; scenarios.

use tracing::{debug, info};

use crate::blocking::{BlockingCondition, INPUT_MODE_PROMPT};
use crate::client::{Target, WebtileClient};
use crate::error::{AuthError, Result, WebtileError};
use crate::protocol::{ClientMessage, MessageKind};

/// Keys that tick "pregenerate levels" on the seed selection screen and
/// confirm it.
const PREGENERATE_KEYS: &str = "\t\t\t \r";

/// Seed value asking the server for a random seed.
const RANDOM_SEED: &str = "0";

/// Seed games built from a scenario are started with.
const SCENARIO_SEED: &str = "1";

/// RC options for scenario games: no "more" prompts, no rest delay.
const SCENARIO_RC: &str = "show_more = false\nrest_delay = -1";

impl WebtileClient {
    /// Start a new game with a random seed.
    ///
    /// `species`, `background` and `weapon` are the menu hotkeys of the new
    /// game screens (e.g. `"b"`, `"f"`, `"b"` for a minotaur berserker with
    /// a mace). Answers that the server does not ask for are ignored.
    pub async fn start_game(
        &mut self,
        game_id: &str,
        species: &str,
        background: &str,
        weapon: &str,
    ) -> Result<()> {
        self.start_game_seeded(game_id, RANDOM_SEED, false, species, background, weapon)
            .await
    }

    /// Start a new game with a fixed seed, optionally pregenerating levels.
    ///
    /// Returns once the first `map` push arrives. The server announces the
    /// seed in a `msgs` push; check it with
    /// [`announces_seed`](crate::blocking::announces_seed).
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotLoggedIn`] without an active login
    /// - [`WebtileError::Protocol`] if the server asks more than three new
    ///   game questions
    /// - [`WebtileError::Blocking`] for any other prompt on the way
    pub async fn start_game_seeded(
        &mut self,
        game_id: &str,
        seed: &str,
        pregenerate: bool,
        species: &str,
        background: &str,
        weapon: &str,
    ) -> Result<()> {
        self.require_login()?;
        info!(game_id, seed, pregenerate, "starting game");
        self.send(&ClientMessage::Play {
            game_id: game_id.to_owned(),
        })?;

        let mut choices = [species, background, weapon].into_iter();
        loop {
            match self.read_until(MessageKind::Map).await {
                Ok(_) => break,
                Err(WebtileError::Blocking(BlockingCondition::SeedSelection)) => {
                    self.write_key("-")?;
                    self.read_until(MessageKind::UiStateSync).await?;
                    self.write_key(seed)?;
                    self.write_key(if pregenerate { PREGENERATE_KEYS } else { "\r" })?;
                }
                Err(WebtileError::Blocking(BlockingCondition::NewGameChoice)) => {
                    let choice = choices.next().ok_or_else(|| {
                        WebtileError::Protocol("more than three new game choices".to_owned())
                    })?;
                    self.write_key(choice)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Resume a saved game. Returns once the first `map` push arrives.
    ///
    /// # Errors
    ///
    /// [`WebtileError::Blocking`] with
    /// [`NewGameChoice`](BlockingCondition::NewGameChoice) if there is no
    /// save for `game_id`.
    pub async fn continue_game(&mut self, game_id: &str) -> Result<()> {
        self.require_login()?;
        info!(game_id, "continuing game");
        self.send(&ClientMessage::Play {
            game_id: game_id.to_owned(),
        })?;
        self.read_until(MessageKind::Map).await?;
        Ok(())
    }

    /// Save and exit the current game. Does not wait for the lobby.
    pub fn save_game(&mut self) -> Result<()> {
        info!("saving game");
        self.write_key("key_ctrl_s")
    }

    /// Quit (abandon) the current game and return to the lobby.
    ///
    /// The session stays logged in.
    pub async fn quit_game(&mut self) -> Result<()> {
        info!("quitting game");
        self.write_key("key_ctrl_q")?;

        let confirmation = Target::new(MessageKind::InputMode.as_str())
            .with_value("mode", INPUT_MODE_PROMPT);
        match self.read_until(confirmation).await {
            Ok(_) | Err(WebtileError::Blocking(BlockingCondition::TextInput)) => {}
            Err(e) => return Err(e),
        }
        self.write_key("yes")?;
        self.write_key("key_enter")?;

        match self.read_until(MessageKind::CloseInput).await {
            Ok(_) | Err(WebtileError::Blocking(BlockingCondition::More)) => {}
            Err(e) => return Err(e),
        }

        // Death screens and "more" prompts until the lobby shows up.
        loop {
            self.write_key("key_esc")?;
            match self.read_until(MessageKind::GoLobby).await {
                Ok(_) => return Ok(()),
                Err(WebtileError::Blocking(BlockingCondition::More | BlockingCondition::Died)) => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch the RC file of `game_id`. An empty file is valid.
    pub async fn get_rc_file(&mut self, game_id: &str) -> Result<String> {
        self.send(&ClientMessage::GetRc {
            game_id: game_id.to_owned(),
        })?;
        let reply = self.read_until(MessageKind::RcfileContents).await?;
        reply
            .str_field("contents")
            .map(ToOwned::to_owned)
            .ok_or_else(|| WebtileError::Protocol(format!("rcfile_contents without contents: {reply}")))
    }

    /// Overwrite the RC file of `game_id`. The server does not acknowledge.
    pub fn set_rc_file(&mut self, game_id: &str, contents: &str) -> Result<()> {
        debug!(game_id, len = contents.len(), "writing RC file");
        self.send(&ClientMessage::SetRc {
            game_id: game_id.to_owned(),
            contents: contents.to_owned(),
        })
    }

    /// Build `definition` with the scenario service and start a game on it.
    ///
    /// # Errors
    ///
    /// [`WebtileError::Scenario`] with the service's diagnostic, verbatim,
    /// if the definition is rejected.
    pub async fn start_game_with_scenario(
        &mut self,
        game_id: &str,
        species: &str,
        background: &str,
        weapon: &str,
        definition: &str,
    ) -> Result<()> {
        self.require_login()?;
        self.send(&ClientMessage::BuildScenario {
            game_id: game_id.to_owned(),
            definition: definition.to_owned(),
        })?;

        let reply = self
            .read_matching("scenario reply", |message| {
                matches!(
                    message.kind(),
                    MessageKind::ScenarioReady | MessageKind::ScenarioError
                )
            })
            .await?;
        if reply.kind() == &MessageKind::ScenarioError {
            let diagnostic = reply.str_field("error").unwrap_or_default().to_owned();
            info!(game_id, error = %diagnostic, "scenario rejected");
            return Err(WebtileError::Scenario(diagnostic));
        }

        self.set_rc_file(game_id, SCENARIO_RC)?;
        self.start_game_seeded(game_id, SCENARIO_SEED, false, species, background, weapon)
            .await
    }

    fn require_login(&self) -> Result<()> {
        match self.username() {
            Some(_) => Ok(()),
            None => Err(AuthError::NotLoggedIn.into()),
        }
    }
}
