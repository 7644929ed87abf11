//! Campaigns: one theme answered by many respondents.
//!
//! [`aggregate`] reduces completed respondent sessions into deduplicated
//! fact counts and keyword frequencies; [`CampaignService`] wraps it with
//! storage, authorization, cross-analysis and export.

mod aggregate;
mod service;

pub use aggregate::*;
pub use service::*;
