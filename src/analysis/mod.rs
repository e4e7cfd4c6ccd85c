//! # Call Analysis Module
//!
//! Everything that happens to an analysis event after it is decoded off
//! the wire: speaker tracking, transcript assembly, risk assessment, and
//! highlight projection for display.
//!
//! ## Key Components:
//! - **Aggregator**: single consumer of decoded events, owns all call state
//! - **Speaker Registry**: who is on the call and what we believe about them
//! - **Risk Ladder**: sticky call-level verdict that only climbs
//! - **Highlight Projector**: splits transcript lines into renderable segments
//!
//! ## State Rules:
//! All state lives for exactly one call. An alert verdict is permanent
//! within a call, speaker facts are never erased by partial updates, and
//! re-delivered events are dropped before they can mutate anything. A new
//! call starts from a clean slate.

pub mod aggregator; // Event consumption and canonical call state
pub mod highlight;  // Transcript line segmentation for display
pub mod risk;       // Sticky risk ladder and rationale retention
pub mod speakers;   // Speaker registry, classification, merging

pub use aggregator::{Aggregator, StateDelta, TranscriptEntry};
pub use risk::{RiskLevel, RiskState};
