//! Terminal front end: prefetching assets, playing, and editing preferences.

mod progress;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use console::{StyledObject, style};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

use crate::cache::{DiskCache, OfflineCache};
use crate::config::AppConfig;
use crate::country::Country;
use crate::error::{AssetKind, Error, Result};
use crate::fs::FileSystem;
use crate::game::{
    CardFace, DEFAULT_PAIRS, DEFAULT_QUIZ_OPTIONS, PairsBoard, QuizRound, QuizSession,
    RevealOutcome,
};
use crate::net::{HttpFetcher, build_http_client, parse_url};
use crate::prefetch::{ImageSelection, PrefetchPlan, PrefetchProgress, Prefetcher};
use crate::prefs::{GameMode, Preferences, Theme};
use crate::resolver::AssetResolver;
use crate::store::{FileStore, Store};

pub use progress::{CliProgress, format_bytes, format_duration, print_summary};

/// Default number of quiz questions per game.
pub const DEFAULT_ROUNDS: usize = 10;

// ============================================================================
// Argument parsing
// ============================================================================

/// Options for `flag-quiz fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// What to write.
    pub plan: PrefetchPlan,
    /// Overwrite existing files.
    pub force: bool,
    /// Concurrent image downloads, overriding the config file.
    pub parallel: Option<usize>,
    /// Asset root, overriding the config file.
    pub root: Option<PathBuf>,
}

/// Options for `flag-quiz play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayOptions {
    /// Mode for this game; the saved preference when absent.
    pub mode: Option<GameMode>,
    /// Quiz questions, or pairs on the board in pairs mode.
    pub rounds: Option<usize>,
}

/// Requested theme change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeChange {
    /// Set an explicit theme.
    Set(Theme),
    /// Flip the currently displayed palette.
    Toggle,
}

/// Options for `flag-quiz prefs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefsOptions {
    /// Theme to apply.
    pub theme: Option<ThemeChange>,
    /// Game mode to save.
    pub mode: Option<GameMode>,
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> std::result::Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_count(value: &str, flag: &str) -> std::result::Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{flag} expects a positive number, got {value:?}")),
    }
}

/// Parses the arguments following `fetch`.
///
/// # Errors
///
/// Returns a message describing the first unusable argument.
pub fn parse_fetch_args(args: &[String]) -> std::result::Result<FetchOptions, String> {
    let mut options = FetchOptions {
        plan: PrefetchPlan::default(),
        force: false,
        parallel: None,
        root: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--json-only" | "--no-images" => {
                options.plan.write_json = true;
                options.plan.images = ImageSelection::None;
            }
            "--svg-only" => {
                options.plan.write_json = false;
                options.plan.images = ImageSelection::Svg;
            }
            "--png-only" => {
                options.plan.write_json = false;
                options.plan.images = ImageSelection::Png;
            }
            "--both" => options.plan.images = ImageSelection::Both,
            "-n" | "--limit" => {
                let value = next_value(args, &mut i, "--limit")?;
                options.plan.limit = Some(parse_count(value, "--limit")?);
            }
            "-f" | "--force" => options.force = true,
            "-p" | "--parallel" => {
                let value = next_value(args, &mut i, "--parallel")?;
                options.parallel = Some(parse_count(value, "--parallel")?);
            }
            "--root" => {
                options.root = Some(PathBuf::from(next_value(args, &mut i, "--root")?));
            }
            other => return Err(format!("Unknown option: {other}")),
        }
        i += 1;
    }

    Ok(options)
}

/// Parses the arguments following `play`.
///
/// # Errors
///
/// Returns a message describing the first unusable argument.
pub fn parse_play_args(args: &[String]) -> std::result::Result<PlayOptions, String> {
    let mut options = PlayOptions {
        mode: None,
        rounds: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-m" | "--mode" => {
                options.mode = Some(next_value(args, &mut i, "--mode")?.parse()?);
            }
            "-r" | "--rounds" => {
                let value = next_value(args, &mut i, "--rounds")?;
                options.rounds = Some(parse_count(value, "--rounds")?);
            }
            other => return Err(format!("Unknown option: {other}")),
        }
        i += 1;
    }

    Ok(options)
}

/// Parses the arguments following `prefs`.
///
/// # Errors
///
/// Returns a message describing the first unusable argument.
pub fn parse_prefs_args(args: &[String]) -> std::result::Result<PrefsOptions, String> {
    let mut options = PrefsOptions::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-t" | "--theme" => {
                let value = next_value(args, &mut i, "--theme")?;
                options.theme = Some(if value.eq_ignore_ascii_case("toggle") {
                    ThemeChange::Toggle
                } else {
                    ThemeChange::Set(value.parse()?)
                });
            }
            "-m" | "--mode" => {
                options.mode = Some(next_value(args, &mut i, "--mode")?.parse()?);
            }
            other => return Err(format!("Unknown option: {other}")),
        }
        i += 1;
    }

    Ok(options)
}

// ============================================================================
// Shared wiring
// ============================================================================

/// Guesses whether the terminal has a dark background from `COLORFGBG`.
///
/// Assumes dark when the variable is absent.
fn terminal_prefers_dark() -> bool {
    env::var("COLORFGBG")
        .ok()
        .and_then(|v| v.rsplit(';').next().and_then(|bg| bg.parse::<u8>().ok()))
        .is_none_or(|bg| bg < 7 || bg == 8)
}

/// Colours for the active theme.
#[derive(Debug, Clone, Copy)]
struct Palette {
    dark: bool,
}

impl Palette {
    fn new(theme: Theme) -> Self {
        Self {
            dark: theme.is_dark(terminal_prefers_dark()),
        }
    }

    fn accent<D>(self, value: D) -> StyledObject<D> {
        if self.dark {
            style(value).cyan().bold()
        } else {
            style(value).blue().bold()
        }
    }

    fn good<D>(self, value: D) -> StyledObject<D> {
        if self.dark {
            style(value).green().bright()
        } else {
            style(value).green()
        }
    }

    fn bad<D>(self, value: D) -> StyledObject<D> {
        if self.dark {
            style(value).red().bright()
        } else {
            style(value).red()
        }
    }
}

fn open_store(config: &AppConfig) -> Arc<dyn Store> {
    Arc::new(FileStore::new(config.paths.store_dir.clone()))
}

/// Builds a resolver whose remote requests go through the on-disk offline
/// cache.
async fn build_resolver(config: &AppConfig, store: Arc<dyn Store>) -> Result<AssetResolver> {
    let origin = parse_url(&config.cache.origin)?;
    let storage = DiskCache::new(config.paths.cache_dir.clone(), config.cache.name.clone());
    match storage.purge_other_namespaces().await {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {n} stale cache namespace(s)"),
        Err(e) => log::warn!("Failed to clean old caches: {e}"),
    }

    let network = HttpFetcher::with_origin(build_http_client()?, origin.clone());
    let cache = OfflineCache::new(origin, Arc::new(storage), Arc::new(network));

    Ok(AssetResolver::new(
        config.assets.clone(),
        config.remote.clone(),
        Arc::new(cache),
        store,
    ))
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

// ============================================================================
// Commands
// ============================================================================

/// Runs `flag-quiz fetch`.
///
/// # Errors
///
/// Returns an error if the country list cannot be fetched or written, or if
/// the run is interrupted.
pub async fn run_fetch(config: AppConfig, options: FetchOptions) -> Result<()> {
    let config = match options.root {
        Some(root) => config.with_asset_root(root),
        None => config,
    };
    let mut prefetch_config = config
        .prefetch
        .clone()
        .with_force_overwrite(options.force || config.prefetch.force_overwrite);
    if let Some(parallel) = options.parallel {
        prefetch_config = prefetch_config.with_concurrent_downloads(parallel);
    }

    let fetcher = Arc::new(HttpFetcher::new(build_http_client()?));
    let prefetcher = Prefetcher::new(
        fetcher,
        config.assets.clone(),
        config.remote.clone(),
        prefetch_config,
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Received SIGINT, cancelling downloads");
            signal_token.cancel();
        }
    });

    println!(
        "Fetching {} into {}",
        config.remote.country_list_url,
        config.assets.root.display()
    );

    let cli_progress = Arc::new(CliProgress::new());
    let progress: Arc<dyn PrefetchProgress> = cli_progress.clone();
    let result = prefetcher.run(&options.plan, &progress, Some(&token)).await;
    cli_progress.finish();

    let stats = result?;
    print_summary(&stats);
    if !stats.is_clean() {
        log::warn!("{} flag(s) failed to download", stats.files_failed);
    }
    Ok(())
}

/// Runs `flag-quiz play`.
///
/// # Errors
///
/// Returns an error if no country list can be resolved, the list is too
/// small for the chosen mode, or stdin cannot be read.
pub async fn run_play(config: AppConfig, options: PlayOptions) -> Result<()> {
    let store = open_store(&config);
    let mut prefs = Preferences::load(store.as_ref()).await?;
    if let Some(mode) = options.mode
        && mode != prefs.mode
    {
        prefs.set_mode(store.as_ref(), mode).await?;
    }

    let resolver = build_resolver(&config, store).await?;
    let list = resolver.load_countries().await?;
    log::info!("Playing with {} countries ({})", list.countries.len(), list.origin);

    let palette = Palette::new(prefs.theme);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rng = rand::rng();

    match prefs.mode {
        GameMode::Quiz => {
            let rounds = options.rounds.unwrap_or(DEFAULT_ROUNDS);
            play_quiz(&resolver, &list.countries, rounds, palette, &mut lines, &mut rng).await
        }
        GameMode::Pairs => {
            let pairs = options.rounds.unwrap_or(DEFAULT_PAIRS);
            let board = PairsBoard::generate(&list.countries, pairs, &mut rng)?;
            play_pairs(board, palette, &mut lines).await
        }
    }
}

async fn play_quiz(
    resolver: &AssetResolver,
    pool: &[Country],
    rounds: usize,
    palette: Palette,
    lines: &mut Lines<BufReader<Stdin>>,
    rng: &mut impl rand::Rng,
) -> Result<()> {
    let mut session = QuizSession::new();

    for number in 1..=rounds {
        let round = QuizRound::generate(pool, DEFAULT_QUIZ_OPTIONS, rng)?;

        // Warms the offline cache; the terminal shows the emoji rendering.
        let detail = match resolver.load_flag(&round.answer.code).await {
            Ok(flag) => format!(
                "{} {}, {}",
                flag.format,
                format_bytes(flag.bytes.len() as u64),
                flag.origin
            ),
            Err(e) => {
                log::warn!("{e}");
                "image unavailable".to_string()
            }
        };

        println!(
            "\n{} {}  {}",
            palette.accent(format!("Round {number}/{rounds}")),
            round.answer.flag_emoji(),
            style(format!("({detail})")).dim()
        );
        for (i, option) in round.options.iter().enumerate() {
            println!("  {}. {}", i + 1, option.name);
        }

        let Some(line) = prompt(lines, "Your answer: ").await? else {
            break;
        };
        let correct = line
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| round.options.get(i))
            .is_some_and(|choice| round.is_correct(&choice.code));
        session.record(correct);

        if correct {
            println!("{}", palette.good("Correct!"));
        } else {
            println!(
                "{} It was {}.",
                palette.bad("Wrong."),
                round.options[round.answer_index()].name
            );
        }
    }

    println!(
        "\nScore {}/{} ({}%), best streak {}",
        palette.accent(session.score),
        session.answered,
        session.accuracy(),
        session.best_streak
    );
    Ok(())
}

fn card_label(board: &PairsBoard, index: usize) -> String {
    let card = &board.cards()[index];
    match card.face {
        CardFace::Flag => card.country.flag_emoji(),
        CardFace::Name => card.country.name.clone(),
    }
}

fn print_board(board: &PairsBoard, palette: Palette) {
    println!();
    for index in 0..board.cards().len() {
        let label = if board.is_matched(index) {
            palette.good(card_label(board, index)).to_string()
        } else {
            "?".to_string()
        };
        println!("  {:>2}. {label}", index + 1);
    }
}

fn parse_pick(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split_whitespace().map(|p| p.parse::<usize>().ok());
    let a = parts.next()??.checked_sub(1)?;
    let b = parts.next()??.checked_sub(1)?;
    Some((a, b))
}

async fn play_pairs(
    mut board: PairsBoard,
    palette: Palette,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    while !board.is_complete() {
        print_board(&board, palette);
        let Some(line) = prompt(lines, "Turn over two cards (e.g. 1 4): ").await? else {
            break;
        };
        let Some((a, b)) = parse_pick(&line) else {
            println!("Enter two card numbers.");
            continue;
        };

        match board.reveal(a, b) {
            RevealOutcome::Match => println!(
                "{} {} = {}",
                palette.good("Match!"),
                card_label(&board, a),
                card_label(&board, b)
            ),
            RevealOutcome::Mismatch => println!(
                "{} {} / {}",
                palette.bad("No match:"),
                card_label(&board, a),
                card_label(&board, b)
            ),
            RevealOutcome::Invalid => println!("Pick two different face-down cards."),
        }
    }

    println!(
        "\n{} pair(s) matched in {} moves",
        palette.accent(board.matched_pairs()),
        board.moves()
    );
    Ok(())
}

/// Runs `flag-quiz prefs`: applies any changes, then prints the result.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub async fn run_prefs(config: AppConfig, options: PrefsOptions) -> Result<()> {
    let store = open_store(&config);
    let mut prefs = Preferences::load(store.as_ref()).await?;

    match options.theme {
        Some(ThemeChange::Set(theme)) => prefs.set_theme(store.as_ref(), theme).await?,
        Some(ThemeChange::Toggle) => {
            prefs
                .toggle_theme(store.as_ref(), terminal_prefers_dark())
                .await?;
        }
        None => {}
    }
    if let Some(mode) = options.mode {
        prefs.set_mode(store.as_ref(), mode).await?;
    }

    let palette = Palette::new(prefs.theme);
    println!(
        "theme: {} ({} palette)",
        palette.accent(prefs.theme),
        if palette.dark { "dark" } else { "light" }
    );
    println!("mode:  {}", palette.accent(prefs.mode));
    Ok(())
}

/// Runs `flag-quiz resolve`: reports where each flag comes from.
///
/// # Errors
///
/// Returns an error if no codes are given or none of them resolve.
pub async fn run_resolve(config: AppConfig, codes: &[String]) -> Result<()> {
    if codes.is_empty() {
        return Err(Error::InvalidCode(String::new()));
    }

    let store = open_store(&config);
    let resolver = build_resolver(&config, store).await?;
    resolve_codes(&resolver, codes).await
}

/// Prints the source of each flag. A missing country list only costs the
/// display names.
async fn resolve_codes<F: FileSystem>(resolver: &AssetResolver<F>, codes: &[String]) -> Result<()> {
    let countries = match resolver.load_countries().await {
        Ok(list) => {
            println!(
                "Country list: {} countries ({})",
                list.countries.len(),
                list.origin
            );
            list.countries
        }
        Err(e) => {
            log::warn!("Country names unavailable: {e}");
            Vec::new()
        }
    };

    let mut resolved = 0;
    for code in codes {
        let name = countries
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .map_or("unknown", |c| c.name.as_str());

        let source = match resolver.flag_source(code).await {
            Ok(source) => source,
            Err(e) => {
                println!("  {code}: {}", style(e).red());
                continue;
            }
        };

        match resolver.load_flag(code).await {
            Ok(flag) => {
                resolved += 1;
                println!(
                    "  {} {name}: {} {} from {} ({source})",
                    flag.code,
                    flag.format,
                    format_bytes(flag.bytes.len() as u64),
                    flag.origin
                );
            }
            Err(e) => println!("  {code} {name}: {}", style(e).red()),
        }
    }

    if resolved == 0 {
        return Err(Error::MissingAsset {
            kind: AssetKind::FlagImage,
            key: codes.join(","),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn fetch_defaults_to_json_and_svg() {
        let options = parse_fetch_args(&[]).unwrap();
        assert_eq!(options.plan, PrefetchPlan::default());
        assert!(!options.force);
        assert_eq!(options.parallel, None);
    }

    #[test]
    fn fetch_image_only_modes_skip_json() {
        let options = parse_fetch_args(&args(&["--png-only", "--limit", "5"])).unwrap();
        assert!(!options.plan.write_json);
        assert_eq!(options.plan.images, ImageSelection::Png);
        assert_eq!(options.plan.limit, Some(5));

        let options = parse_fetch_args(&args(&["--json-only"])).unwrap();
        assert!(options.plan.write_json);
        assert_eq!(options.plan.images, ImageSelection::None);
    }

    #[test]
    fn fetch_rejects_bad_values() {
        assert!(parse_fetch_args(&args(&["--limit"])).is_err());
        assert!(parse_fetch_args(&args(&["--parallel", "0"])).is_err());
        assert!(parse_fetch_args(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn fetch_root_and_force() {
        let options =
            parse_fetch_args(&args(&["--both", "-f", "-p", "3", "--root", "/tmp/assets"])).unwrap();
        assert_eq!(options.plan.images, ImageSelection::Both);
        assert!(options.force);
        assert_eq!(options.parallel, Some(3));
        assert_eq!(options.root, Some(PathBuf::from("/tmp/assets")));
    }

    #[test]
    fn play_and_prefs_parse_modes() {
        let play = parse_play_args(&args(&["--mode", "pairs", "--rounds", "4"])).unwrap();
        assert_eq!(play.mode, Some(GameMode::Pairs));
        assert_eq!(play.rounds, Some(4));
        assert!(parse_play_args(&args(&["--mode", "chess"])).is_err());

        let prefs = parse_prefs_args(&args(&["--theme", "toggle", "-m", "quiz"])).unwrap();
        assert_eq!(prefs.theme, Some(ThemeChange::Toggle));
        assert_eq!(prefs.mode, Some(GameMode::Quiz));

        let prefs = parse_prefs_args(&args(&["--theme", "Dark"])).unwrap();
        assert_eq!(prefs.theme, Some(ThemeChange::Set(Theme::Dark)));
    }

    #[test]
    fn pick_parsing_is_one_based() {
        assert_eq!(parse_pick("1 4"), Some((0, 3)));
        assert_eq!(parse_pick("  2   3 "), Some((1, 2)));
        assert_eq!(parse_pick("0 1"), None);
        assert_eq!(parse_pick("x 1"), None);
        assert_eq!(parse_pick("1"), None);
    }

    /// Network that is always down.
    struct Offline;

    #[async_trait::async_trait]
    impl crate::net::Fetcher for Offline {
        async fn fetch(&self, request: &crate::net::Request) -> Result<crate::net::Response> {
            Err(Error::Status {
                url: request.url.to_string(),
                status: 0,
            })
        }
    }

    fn offline_resolver(root: &std::path::Path) -> AssetResolver {
        AssetResolver::new(
            crate::config::AssetPaths::rooted(root),
            crate::config::RemoteConfig::default(),
            Arc::new(Offline),
            Arc::new(crate::store::MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn resolve_works_without_country_list() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("flags")).unwrap();
        std::fs::write(dir.path().join("flags/fr.svg"), b"<svg/>").unwrap();

        let resolver = offline_resolver(dir.path());
        assert!(resolver.load_countries().await.is_err());
        assert!(resolve_codes(&resolver, &args(&["fr"])).await.is_ok());
    }

    #[tokio::test]
    async fn resolve_fails_when_no_flag_resolves() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = offline_resolver(dir.path());
        assert!(matches!(
            resolve_codes(&resolver, &args(&["fr", "zz"])).await,
            Err(Error::MissingAsset {
                kind: AssetKind::FlagImage,
                ..
            })
        ));
    }
}
