//! Size validation for resize requests.
//!
//! Users often type a size prefix (`LARGE`) or a title from another
//! provider. [`resolve_size`] maps the request onto a concrete catalog title
//! for the service's provider and region and flags downgrades that the
//! provider cannot perform.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::api::ApiError;
use crate::catalog::{SizeCatalog, SizeEntry};

/// Providers that accept a resize to fewer cores or less memory.
pub const DOWNGRADE_PROVIDERS: &[&str] = &["netcup", "aws", "azure", "scaleway"];

static CPU_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)C").ok());
static RAM_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)G").ok());

fn first_number(pattern: &LazyLock<Option<Regex>>, title: &str) -> u32 {
    pattern
        .as_ref()
        .and_then(|regex| regex.captures(title))
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
        .unwrap_or(0)
}

/// Returns the last `<digits>G` token of `title`, upper-cased.
fn ram_token(title: &str) -> Option<String> {
    RAM_PATTERN
        .as_ref()
        .and_then(|regex| regex.find_iter(title).last())
        .map(|token| token.as_str().to_uppercase())
}

/// Core and memory counts encoded in a size title such as `LARGE-4C-8G`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SizeSpec {
    /// Core count, zero when the title carries none.
    pub cpu: u32,
    /// Memory in gigabytes, zero when the title carries none.
    pub ram_gb: u32,
}

impl SizeSpec {
    /// Parses the first `<digits>C` and `<digits>G` tokens of `title`.
    #[must_use]
    pub fn parse(title: &str) -> Self {
        Self {
            cpu: first_number(&CPU_PATTERN, title),
            ram_gb: first_number(&RAM_PATTERN, title),
        }
    }
}

/// Returns `true` when moving from `current` to `target` reduces cores or
/// memory. Titles without a core count never count as downgrades.
#[must_use]
pub fn is_downgrade(current: &str, target: &str) -> bool {
    let from = SizeSpec::parse(current);
    let to = SizeSpec::parse(target);
    if from.cpu == 0 || to.cpu == 0 {
        return false;
    }
    to.cpu < from.cpu || to.ram_gb < from.ram_gb
}

/// Returns `true` when `provider` supports downgrades.
#[must_use]
pub fn supports_downgrade(provider: &str) -> bool {
    DOWNGRADE_PROVIDERS
        .iter()
        .any(|name| name.eq_ignore_ascii_case(provider))
}

/// A resize target to validate.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SizeQuery {
    /// Requested title or title prefix.
    pub requested: String,
    /// Provider hosting the service.
    pub provider: String,
    /// Region hosting the service.
    pub region: String,
    /// Size the service has today.
    pub current: String,
}

/// How a requested size was matched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// Case-insensitive exact title match.
    Exact,
    /// The request was the prefix of exactly one title.
    AutoCorrected,
    /// Several titles shared the prefix; the one with the current RAM token
    /// was chosen.
    Disambiguated,
}

/// A validated resize target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedSize {
    /// Catalog title to request.
    pub title: String,
    /// How the title was matched.
    pub resolution: Resolution,
    /// `true` when the region had no sizes and the provider-wide list was
    /// used instead.
    pub region_fallback: bool,
    /// `true` when the target has fewer cores or less memory.
    pub downgrade: bool,
}

impl ResolvedSize {
    /// Returns a user-facing note when the title differs from the request.
    #[must_use]
    pub fn warning(&self, query: &SizeQuery) -> Option<String> {
        match self.resolution {
            Resolution::Exact => None,
            Resolution::AutoCorrected | Resolution::Disambiguated => Some(format!(
                "size \"{}\" auto-corrected to \"{}\"",
                query.requested, self.title
            )),
        }
    }
}

/// Errors raised while validating a resize target.
#[derive(Debug, Error)]
pub enum ResizeError {
    /// The request names no size at all.
    #[error("new server type required")]
    MissingSize,
    /// No size matches the request for the provider and region.
    #[error(
        "size \"{requested}\" not available for {provider}/{region}. Available: {}",
        ListDisplay(.available)
    )]
    SizeNotAvailable {
        /// Requested title.
        requested: String,
        /// Provider searched.
        provider: String,
        /// Region searched.
        region: String,
        /// Distinct titles that were available.
        available: Vec<String>,
    },
    /// Several sizes share the requested prefix.
    #[error("multiple sizes match \"{requested}\": {}", ListDisplay(.candidates))]
    AmbiguousSize {
        /// Requested prefix.
        requested: String,
        /// Matching titles.
        candidates: Vec<String>,
    },
    /// The provider cannot shrink machines.
    #[error(
        "downgrade not supported on {provider} ({current} -> {resolved}). Supported: {}",
        DOWNGRADE_PROVIDERS.join(", ")
    )]
    UnsupportedDowngrade {
        /// Provider hosting the service.
        provider: String,
        /// Current size.
        current: String,
        /// Requested size.
        resolved: String,
    },
    /// The catalog or service lookup failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

struct ListDisplay<'a>(&'a [String]);

impl fmt::Display for ListDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

fn distinct_titles<'a>(entries: impl IntoIterator<Item = &'a SizeEntry>) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();
    for entry in entries {
        if !titles.contains(&entry.title) {
            titles.push(entry.title.clone());
        }
    }
    titles
}

/// Resolves `query` against an already fetched catalog.
///
/// # Errors
///
/// Returns [`ResizeError::MissingSize`], [`ResizeError::SizeNotAvailable`],
/// [`ResizeError::AmbiguousSize`], or [`ResizeError::UnsupportedDowngrade`]
/// as described on [`resolve_size`].
pub fn resolve_in(entries: &[SizeEntry], query: &SizeQuery) -> Result<ResolvedSize, ResizeError> {
    if query.requested.trim().is_empty() {
        return Err(ResizeError::MissingSize);
    }
    let provider_sizes: Vec<&SizeEntry> = entries
        .iter()
        .filter(|entry| entry.is_offered_by(&query.provider))
        .collect();
    let region_sizes: Vec<&SizeEntry> = provider_sizes
        .iter()
        .copied()
        .filter(|entry| entry.region.eq_ignore_ascii_case(&query.region))
        .collect();
    let region_fallback = region_sizes.is_empty();
    let pool = if region_fallback {
        warn!(
            provider = %query.provider,
            region = %query.region,
            "no sizes listed for region; matching against every region of the provider"
        );
        provider_sizes
    } else {
        region_sizes
    };

    let (title, resolution) = match_title(&pool, query)?;
    let downgrade = is_downgrade(&query.current, &title);
    if downgrade && !supports_downgrade(&query.provider) {
        return Err(ResizeError::UnsupportedDowngrade {
            provider: query.provider.clone(),
            current: query.current.clone(),
            resolved: title,
        });
    }

    Ok(ResolvedSize {
        title,
        resolution,
        region_fallback,
        downgrade,
    })
}

fn match_title(
    pool: &[&SizeEntry],
    query: &SizeQuery,
) -> Result<(String, Resolution), ResizeError> {
    let requested = query.requested.trim();
    if let Some(exact) = pool
        .iter()
        .find(|entry| entry.title.eq_ignore_ascii_case(requested))
    {
        return Ok((exact.title.clone(), Resolution::Exact));
    }

    let prefix = requested.to_uppercase();
    let candidates = distinct_titles(
        pool.iter()
            .copied()
            .filter(|entry| entry.title.to_uppercase().starts_with(&prefix)),
    );

    match candidates.as_slice() {
        [] => Err(ResizeError::SizeNotAvailable {
            requested: requested.to_owned(),
            provider: query.provider.clone(),
            region: query.region.clone(),
            available: distinct_titles(pool.iter().copied()),
        }),
        [only] => Ok((only.clone(), Resolution::AutoCorrected)),
        several => {
            let current_ram = ram_token(&query.current);
            let same_family: Vec<&String> = several
                .iter()
                .filter(|title| current_ram.is_some() && ram_token(title) == current_ram)
                .collect();
            match same_family.as_slice() {
                [chosen] => Ok(((*chosen).clone(), Resolution::Disambiguated)),
                _ => Err(ResizeError::AmbiguousSize {
                    requested: requested.to_owned(),
                    candidates: several.to_vec(),
                }),
            }
        }
    }
}

/// Resolves `query` against the provider's size catalog.
///
/// Matching order: exact title, then unique prefix, then the prefix match
/// that keeps the current RAM size. When the region lists no sizes the
/// provider's whole catalog is searched.
///
/// # Errors
///
/// Returns [`ResizeError::MissingSize`] for a blank request,
/// [`ResizeError::SizeNotAvailable`] when nothing matches,
/// [`ResizeError::AmbiguousSize`] when several titles remain,
/// [`ResizeError::UnsupportedDowngrade`] when the provider cannot shrink
/// machines, and [`ResizeError::Api`] when the catalog cannot be fetched.
pub async fn resolve_size<C>(
    catalog: &C,
    query: &SizeQuery,
) -> Result<ResolvedSize, ResizeError>
where
    C: SizeCatalog + ?Sized,
{
    let sizes = catalog.sizes().await?;
    resolve_in(&sizes, query)
}
