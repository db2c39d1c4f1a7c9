// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// In-band stream protocol
//
// The generation service interleaves visible prose with three token kinds:
// - `<<JSON_DATA>>` ... `<<JSON_END>>` brackets the structured payload
// - `<<EXERCISE_QUERY:<topic>:<query>>>` requests an enrichment lookup
// - bare `JSON_DATA` / `JSON_END` are delimiter names leaked without their
//   symbolic wrapper
//
// Every function here is pure and prefix-stable: a decision taken on a
// prefix of the stream never changes when more text is appended.

/// Opens the structured block.
pub const BLOCK_OPEN: &str = "<<JSON_DATA>>";
/// Closes the structured block.
pub const BLOCK_CLOSE: &str = "<<JSON_END>>";
/// Prefix of an enrichment request token.
pub const ENRICHMENT_PREFIX: &str = "<<EXERCISE_QUERY:";

const ENRICHMENT_SUFFIX: &str = ">>";
const LEAKED_NAMES: [&str; 2] = ["JSON_DATA", "JSON_END"];
const TOKEN_STARTS: [&str; 3] = [BLOCK_OPEN, BLOCK_CLOSE, ENRICHMENT_PREFIX];

// ---------------------------------------------------------------------------
// Visible-region lexing
// ---------------------------------------------------------------------------

/// One lexing step over the not-yet-decided tail of the visible region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexeme {
    /// Ordinary text of the given byte length; deliver it.
    Text(usize),
    /// Delimiter leakage of the given byte length; drop it and keep lexing.
    Strip(usize),
    /// The visible region ends here (block open or a leaked delimiter name).
    Boundary,
    /// The tail is a proper prefix of some token; wait for more input.
    Pending,
    /// Nothing left to lex.
    End,
}

/// Lex the next step of `rest`.
///
/// With `at_end` set the stream is over and nothing may stay pending: a
/// dangling `<<`-prefixed tail is dropped as leakage, anything else is
/// ordinary text.
pub fn next_lexeme(rest: &str, at_end: bool) -> Lexeme {
    if rest.is_empty() {
        return Lexeme::End;
    }
    match find_candidate(rest) {
        Some(0) if rest.starts_with('<') => lex_angle(rest, at_end),
        Some(0) => lex_name(rest, at_end),
        Some(pos) => Lexeme::Text(pos),
        None => Lexeme::Text(rest.len()),
    }
}

/// Compute the complete visible text of a finished stream.
///
/// The parser reaches the same result incrementally; this one-shot form
/// exists for callers that already hold the whole response.
pub fn visible_text(buffer: &str) -> String {
    let mut out = String::new();
    let mut cursor = 0;
    loop {
        let rest = &buffer[cursor..];
        match next_lexeme(rest, true) {
            Lexeme::Text(n) => {
                out.push_str(&rest[..n]);
                cursor += n;
            }
            Lexeme::Strip(n) => cursor += n,
            Lexeme::Boundary | Lexeme::Pending | Lexeme::End => return out,
        }
    }
}

/// Position of the first byte that may start a token: every `<`, and every
/// `J` that begins (or could still grow into) a leaked delimiter name.
fn find_candidate(rest: &str) -> Option<usize> {
    rest.match_indices(|c: char| c == '<' || c == 'J')
        .map(|(i, _)| i)
        .find(|&i| rest.as_bytes()[i] == b'<' || could_be_leaked_name(&rest[i..]))
}

fn could_be_leaked_name(s: &str) -> bool {
    LEAKED_NAMES
        .iter()
        .any(|name| s.starts_with(name) || name.starts_with(s))
}

fn lex_angle(rest: &str, at_end: bool) -> Lexeme {
    if rest.starts_with(BLOCK_OPEN) {
        return Lexeme::Boundary;
    }
    // A close with no open before it is not a marker, but its literal
    // spelling never reaches the user.
    if rest.starts_with(BLOCK_CLOSE) {
        return Lexeme::Strip(BLOCK_CLOSE.len());
    }
    if rest.starts_with(ENRICHMENT_PREFIX) {
        return match parse_enrichment(rest) {
            EnrichmentMatch::Complete { len, .. } => Lexeme::Strip(len),
            EnrichmentMatch::Partial if at_end => Lexeme::Strip(rest.len()),
            EnrichmentMatch::Partial => Lexeme::Pending,
            EnrichmentMatch::Malformed => Lexeme::Text(1),
        };
    }
    if TOKEN_STARTS.iter().any(|token| token.starts_with(rest)) {
        if !at_end {
            return Lexeme::Pending;
        }
        return if rest.starts_with("<<") {
            Lexeme::Strip(rest.len())
        } else {
            Lexeme::Text(rest.len())
        };
    }
    Lexeme::Text(1)
}

fn lex_name(rest: &str, at_end: bool) -> Lexeme {
    if LEAKED_NAMES.iter().any(|name| rest.starts_with(name)) {
        Lexeme::Boundary
    } else if at_end {
        Lexeme::Text(rest.len())
    } else {
        Lexeme::Pending
    }
}

// ---------------------------------------------------------------------------
// Structured block markers
// ---------------------------------------------------------------------------

/// Where the structured block delimiters stand in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerScan {
    NoMarkerYet,
    OpenSeenCloseMissing { open: usize },
    BothSeen { open: usize, close: usize },
}

/// Scan `buffer[from..]` for the first block open and the first block close
/// strictly after it. Offsets are absolute. A close without a preceding open
/// is ignored.
pub fn scan_markers(buffer: &str, from: usize) -> MarkerScan {
    let Some(rel) = buffer[from..].find(BLOCK_OPEN) else {
        return MarkerScan::NoMarkerYet;
    };
    let open = from + rel;
    let body_start = open + BLOCK_OPEN.len();
    match buffer[body_start..].find(BLOCK_CLOSE) {
        Some(rel) => MarkerScan::BothSeen {
            open,
            close: body_start + rel,
        },
        None => MarkerScan::OpenSeenCloseMissing { open },
    }
}

/// The trimmed text strictly between a block open at `open` and a block
/// close at `close`.
pub fn block_body(buffer: &str, open: usize, close: usize) -> &str {
    buffer[open + BLOCK_OPEN.len()..close].trim()
}

/// Offset just past a block close at `close`.
pub fn block_end(close: usize) -> usize {
    close + BLOCK_CLOSE.len()
}

// ---------------------------------------------------------------------------
// Enrichment tokens
// ---------------------------------------------------------------------------

/// A lookup requested in-band by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub topic: String,
    pub query: String,
}

/// Outcome of matching an enrichment token at the start of a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentMatch {
    /// A full token of `len` bytes.
    Complete {
        len: usize,
        request: EnrichmentRequest,
    },
    /// The string ends inside a token that may still complete.
    Partial,
    /// The string cannot start a token.
    Malformed,
}

/// Match `<<EXERCISE_QUERY:<topic>:<query>>>` at the start of `s`.
///
/// Topic excludes `:` and `>`; query excludes `>`. Both are trimmed.
pub fn parse_enrichment(s: &str) -> EnrichmentMatch {
    let Some(body) = s.strip_prefix(ENRICHMENT_PREFIX) else {
        return if ENRICHMENT_PREFIX.starts_with(s) {
            EnrichmentMatch::Partial
        } else {
            EnrichmentMatch::Malformed
        };
    };
    let Some(sep) = body.find([':', '>']) else {
        return EnrichmentMatch::Partial;
    };
    if body.as_bytes()[sep] == b'>' {
        return EnrichmentMatch::Malformed;
    }
    let topic = &body[..sep];
    let after = &body[sep + 1..];
    let Some(close) = after.find('>') else {
        return EnrichmentMatch::Partial;
    };
    let tail = &after[close..];
    if tail.len() < ENRICHMENT_SUFFIX.len() {
        return EnrichmentMatch::Partial;
    }
    if !tail.starts_with(ENRICHMENT_SUFFIX) {
        return EnrichmentMatch::Malformed;
    }
    EnrichmentMatch::Complete {
        len: ENRICHMENT_PREFIX.len() + sep + 1 + close + ENRICHMENT_SUFFIX.len(),
        request: EnrichmentRequest {
            topic: topic.trim().to_string(),
            query: after[..close].trim().to_string(),
        },
    }
}

/// Find the next enrichment token at or after `from`.
///
/// Returns the scan outcome and the absolute offset it refers to. On
/// `Partial` the offset is where the unfinished token starts, so a later
/// scan can resume there; `None` means no token start remains.
pub fn next_enrichment(buffer: &str, from: usize) -> Option<(usize, EnrichmentMatch)> {
    let mut cursor = from;
    while let Some(rel) = buffer[cursor..].find(ENRICHMENT_PREFIX) {
        let start = cursor + rel;
        match parse_enrichment(&buffer[start..]) {
            EnrichmentMatch::Malformed => cursor = start + 1,
            found => return Some((start, found)),
        }
    }
    None
}
