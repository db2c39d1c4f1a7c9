// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// Drives one parser per generation response: feeds fragments from an async
// input stream into the parser and forwards parser events to a bounded
// output stream consumed by the transport layer.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::enrichment::{EnrichmentDispatcher, ExerciseLookup};
use super::followup::OptionAugmenter;
use super::parser::HybridStreamParser;
use super::types::{EventSink, ParserOptions, StreamEvent};

/// Capacity of the outbound event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
struct EnrichmentSettings {
    lookup: Arc<dyn ExerciseLookup>,
    result_limit: usize,
    timeout: Duration,
}

/// Builds and drives parsers with shared, per-deployment collaborators.
///
/// The augmenter and lookup are shared by every response; parser state
/// never is.
#[derive(Clone)]
pub struct StreamProcessor {
    options: ParserOptions,
    augmenter: Arc<dyn OptionAugmenter>,
    enrichment: Option<EnrichmentSettings>,
}

impl StreamProcessor {
    pub fn new(options: ParserOptions, augmenter: Arc<dyn OptionAugmenter>) -> Self {
        Self {
            options,
            augmenter,
            enrichment: None,
        }
    }

    pub fn with_enrichment(
        mut self,
        lookup: Arc<dyn ExerciseLookup>,
        result_limit: usize,
        timeout: Duration,
    ) -> Self {
        self.enrichment = Some(EnrichmentSettings {
            lookup,
            result_limit,
            timeout,
        });
        self
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// A fresh parser for one response. `locale` overrides the configured
    /// default when present.
    pub fn parser(&self, locale: Option<&str>, sink: EventSink) -> HybridStreamParser {
        let mut options = self.options.clone();
        if let Some(locale) = locale.filter(|l| !l.trim().is_empty()) {
            options.locale = locale.to_string();
        }
        let parser = HybridStreamParser::new(options, self.augmenter.clone(), sink);
        match &self.enrichment {
            Some(settings) => parser.with_enrichment(EnrichmentDispatcher::new(
                settings.lookup.clone(),
                settings.result_limit,
                settings.timeout,
            )),
            None => parser,
        }
    }

    /// Parse an input fragment stream, producing the event stream.
    ///
    /// An upstream error mid-stream ends the input: the parser is finalized
    /// anyway so the consumer still receives its fallback and `complete`.
    /// Processing stops as soon as the consumer goes away.
    pub fn process<S, E>(&self, mut input: S, locale: Option<String>) -> ReceiverStream<StreamEvent>
    where
        S: Stream<Item = Result<String, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let (sink, mut events) = EventSink::channel();
        let mut parser = self.parser(locale.as_deref(), sink);
        let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(event) = events.recv() => {
                        if tx.send(event).await.is_err() {
                            return; // Client disconnected
                        }
                    }
                    next = input.next() => match next {
                        Some(Ok(fragment)) => parser.process_chunk(&fragment),
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "upstream stream failed, finalizing early");
                            break;
                        }
                        None => break,
                    }
                }
            }

            // Keep forwarding while the finalizer waits on outstanding lookups.
            {
                let finish = parser.complete();
                tokio::pin!(finish);
                loop {
                    tokio::select! {
                        biased;
                        Some(event) = events.recv() => {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        () = &mut finish => break,
                    }
                }
            }
            // Closes the event channel once every sink clone is gone.
            drop(parser);
            while let Some(event) = events.recv().await {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
