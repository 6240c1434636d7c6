//! # Relay Node
//!
//! HTTP and WebSocket front end for the [`relay_realtime`] event hub.
//!
//! ## Routes
//!
//! | Route                   | Description                               |
//! |-------------------------|-------------------------------------------|
//! | `GET /`                 | Small browser client for manual testing   |
//! | `GET /ws`               | WebSocket endpoint, one hub session each  |
//! | `GET /sum/{*numbers}`   | Sum of `/`-separated numbers              |
//! | `GET /api/realtime/stats` | Hub counters and registered handlers    |
//! | `GET /metrics`          | Prometheus metrics                        |

pub mod api;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod realtime_api;
pub mod sum_api;
