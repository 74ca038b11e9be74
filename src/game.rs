//! Round generation and scoring for the quiz and pairs modes.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::country::Country;
use crate::error::{Error, Result};

/// Default number of choices in a quiz round.
pub const DEFAULT_QUIZ_OPTIONS: usize = 4;

/// Default number of pairs on a pairs board.
pub const DEFAULT_PAIRS: usize = 6;

/// Picks `count` distinct countries from `pool` in random order.
fn sample<R: Rng + ?Sized>(pool: &[Country], count: usize, rng: &mut R) -> Vec<Country> {
    let mut indexes: Vec<usize> = (0..pool.len()).collect();
    indexes.shuffle(rng);
    indexes
        .into_iter()
        .take(count)
        .map(|i| pool[i].clone())
        .collect()
}

/// One multiple-choice question: which of `options` owns the shown flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRound {
    /// The country whose flag is shown.
    pub answer: Country,
    /// Shuffled choices, `answer` included exactly once.
    pub options: Vec<Country>,
}

impl QuizRound {
    /// Generates a round with `options` distinct choices drawn from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Game`] if fewer than two options are requested or the
    /// pool is smaller than `options`.
    pub fn generate<R: Rng + ?Sized>(pool: &[Country], options: usize, rng: &mut R) -> Result<Self> {
        if options < 2 {
            return Err(Error::Game(format!(
                "a quiz round needs at least 2 options, got {options}"
            )));
        }
        if pool.len() < options {
            return Err(Error::Game(format!(
                "need {options} countries for a quiz round, only {} available",
                pool.len()
            )));
        }

        let options = sample(pool, options, rng);
        let answer = options[rng.random_range(0..options.len())].clone();
        Ok(Self { answer, options })
    }

    /// Returns true if `code` names the answer.
    #[must_use]
    pub fn is_correct(&self, code: &str) -> bool {
        self.answer.code.eq_ignore_ascii_case(code.trim())
    }

    /// Position of the answer within `options`.
    #[must_use]
    pub fn answer_index(&self) -> usize {
        self.options
            .iter()
            .position(|c| c.code == self.answer.code)
            .unwrap_or_default()
    }
}

/// Running score of a quiz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuizSession {
    /// Correct answers.
    pub score: u32,
    /// Questions answered.
    pub answered: u32,
    /// Current run of correct answers.
    pub streak: u32,
    /// Longest run of correct answers.
    pub best_streak: u32,
}

impl QuizSession {
    /// Creates an empty session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            score: 0,
            answered: 0,
            streak: 0,
            best_streak: 0,
        }
    }

    /// Records an answer.
    pub fn record(&mut self, correct: bool) {
        self.answered += 1;
        if correct {
            self.score += 1;
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
        } else {
            self.streak = 0;
        }
    }

    /// Percentage of correct answers, rounded down.
    #[must_use]
    pub const fn accuracy(&self) -> u32 {
        if self.answered == 0 {
            0
        } else {
            self.score * 100 / self.answered
        }
    }
}

/// Which side of a pair a card shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFace {
    /// The flag.
    Flag,
    /// The country name.
    Name,
}

/// A card on a pairs board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Country the card belongs to.
    pub country: Country,
    /// What the card shows.
    pub face: CardFace,
}

/// Result of turning over two cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Flag and name of the same country; both stay face up.
    Match,
    /// Different countries; both turn back over.
    Mismatch,
    /// Same card twice, out of range, or already matched. Not counted as a move.
    Invalid,
}

/// A pairs (memory) board: each country contributes a flag card and a name card.
#[derive(Debug, Clone)]
pub struct PairsBoard {
    cards: Vec<Card>,
    matched: Vec<bool>,
    moves: u32,
}

impl PairsBoard {
    /// Generates a shuffled board of `pairs` countries drawn from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Game`] if `pairs` is zero or exceeds the pool size.
    pub fn generate<R: Rng + ?Sized>(pool: &[Country], pairs: usize, rng: &mut R) -> Result<Self> {
        if pairs == 0 || pool.len() < pairs {
            return Err(Error::Game(format!(
                "need {pairs} countries for a pairs board, only {} available",
                pool.len()
            )));
        }

        let mut cards: Vec<Card> = sample(pool, pairs, rng)
            .into_iter()
            .flat_map(|country| {
                [
                    Card {
                        country: country.clone(),
                        face: CardFace::Flag,
                    },
                    Card {
                        country,
                        face: CardFace::Name,
                    },
                ]
            })
            .collect();
        cards.shuffle(rng);

        let matched = vec![false; cards.len()];
        Ok(Self {
            cards,
            matched,
            moves: 0,
        })
    }

    /// Cards in board order.
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Returns true if the card at `index` has been matched.
    #[must_use]
    pub fn is_matched(&self, index: usize) -> bool {
        self.matched.get(index).copied().unwrap_or(false)
    }

    /// Number of valid reveals so far.
    #[must_use]
    pub const fn moves(&self) -> u32 {
        self.moves
    }

    /// Number of matched pairs.
    #[must_use]
    pub fn matched_pairs(&self) -> usize {
        self.matched.iter().filter(|m| **m).count() / 2
    }

    /// Returns true once every card is matched.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.matched.iter().all(|m| *m)
    }

    /// Turns over the cards at `a` and `b`.
    pub fn reveal(&mut self, a: usize, b: usize) -> RevealOutcome {
        if a == b || a >= self.cards.len() || b >= self.cards.len() {
            return RevealOutcome::Invalid;
        }
        if self.matched[a] || self.matched[b] {
            return RevealOutcome::Invalid;
        }

        self.moves += 1;
        if self.cards[a].country.code == self.cards[b].country.code {
            self.matched[a] = true;
            self.matched[b] = true;
            RevealOutcome::Match
        } else {
            RevealOutcome::Mismatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn pool() -> Vec<Country> {
        vec![
            Country::new("BR", "Brazil"),
            Country::new("DE", "Germany"),
            Country::new("FR", "France"),
            Country::new("JP", "Japan"),
            Country::new("US", "United States"),
        ]
    }

    #[test]
    fn quiz_round_has_distinct_options_including_answer() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let round = QuizRound::generate(&pool(), 4, &mut rng).unwrap();
            let codes: HashSet<_> = round.options.iter().map(|c| c.code.clone()).collect();
            assert_eq!(codes.len(), 4);
            assert!(codes.contains(&round.answer.code));
            assert_eq!(round.options[round.answer_index()], round.answer);
            assert!(round.is_correct(&round.answer.code.to_lowercase()));
        }
    }

    #[test]
    fn quiz_round_rejects_small_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            QuizRound::generate(&pool()[..3], 4, &mut rng),
            Err(Error::Game(_))
        ));
        assert!(matches!(
            QuizRound::generate(&pool(), 1, &mut rng),
            Err(Error::Game(_))
        ));
    }

    #[test]
    fn quiz_session_tracks_streaks() {
        let mut session = QuizSession::new();
        for correct in [true, true, false, true, true, true, false] {
            session.record(correct);
        }
        assert_eq!(session.score, 5);
        assert_eq!(session.answered, 7);
        assert_eq!(session.streak, 0);
        assert_eq!(session.best_streak, 3);
        assert_eq!(session.accuracy(), 71);
        assert_eq!(QuizSession::new().accuracy(), 0);
    }

    #[test]
    fn pairs_board_has_one_flag_and_one_name_per_country() {
        let mut rng = StdRng::seed_from_u64(3);
        let board = PairsBoard::generate(&pool(), 3, &mut rng).unwrap();
        assert_eq!(board.cards().len(), 6);

        let flags: HashSet<_> = board
            .cards()
            .iter()
            .filter(|c| c.face == CardFace::Flag)
            .map(|c| c.country.code.clone())
            .collect();
        let names: HashSet<_> = board
            .cards()
            .iter()
            .filter(|c| c.face == CardFace::Name)
            .map(|c| c.country.code.clone())
            .collect();
        assert_eq!(flags.len(), 3);
        assert_eq!(flags, names);
    }

    #[test]
    fn pairs_board_play_through() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut board = PairsBoard::generate(&pool(), 2, &mut rng).unwrap();
        let cards = board.cards().to_vec();

        let first = &cards[0].country.code;
        let partner = (1..cards.len())
            .find(|&i| &cards[i].country.code == first)
            .unwrap();
        let other = (1..cards.len())
            .find(|&i| &cards[i].country.code != first)
            .unwrap();

        assert_eq!(board.reveal(0, 0), RevealOutcome::Invalid);
        assert_eq!(board.reveal(0, 99), RevealOutcome::Invalid);
        assert_eq!(board.reveal(0, other), RevealOutcome::Mismatch);
        assert_eq!(board.reveal(0, partner), RevealOutcome::Match);
        assert_eq!(board.reveal(0, other), RevealOutcome::Invalid);
        assert_eq!(board.matched_pairs(), 1);
        assert!(!board.is_complete());

        let remaining: Vec<usize> = (0..cards.len()).filter(|&i| !board.is_matched(i)).collect();
        assert_eq!(board.reveal(remaining[0], remaining[1]), RevealOutcome::Match);
        assert!(board.is_complete());
        assert_eq!(board.moves(), 3);
    }

    #[test]
    fn pairs_board_rejects_bad_sizes() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(PairsBoard::generate(&pool(), 0, &mut rng).is_err());
        assert!(PairsBoard::generate(&pool(), 6, &mut rng).is_err());
    }
}
