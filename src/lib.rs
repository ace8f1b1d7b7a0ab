//! # Review Harness
//!
//! Ask free-form questions about a place and get answers grounded in its
//! public reviews.
//!
//! Review Harness fetches a bounded number of reviews for a place, caches
//! them durably, embeds their text into a per-place vector index, and runs
//! a multi-turn retrieval conversation over that index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ReviewFetcher │──▶│ ReviewCache  │──▶│ IndexBuilder │──▶│ RetrievalSession │
//! │ (SerpApi)    │   │  (SQLite)    │   │ embed+store  │   │ condense/answer  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────────┘
//!                              ▲                ▲                    ▲
//!                              └──── PlaceExplorer (one session per place)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rh init                                 # create database
//! rh suggest "cubbon park"                # find a place id
//! rh fetch ChIJ...                        # fetch and cache reviews
//! rh ask ChIJ... "Is parking easy?"       # one-shot question
//! rh chat ChIJ...                         # multi-turn conversation
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`errors`] | Typed pipeline errors |
//! | [`source`] | Review source trait and SerpApi client |
//! | [`fetcher`] | Bounded review pagination |
//! | [`cache`] | Read-through review cache |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index and its builder |
//! | [`llm`] | Answer synthesis |
//! | [`session`] | Per-place conversational retrieval |
//! | [`explorer`] | Place selection and question routing |
//! | [`places`] | Place-name suggestions |
//! | [`store`] | Storage backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Namespace creation |

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod errors;
pub mod explorer;
pub mod fetcher;
pub mod index;
pub mod llm;
pub mod locks;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod places;
pub mod prompts;
pub mod session;
pub mod source;
pub mod stats;
pub mod store;
