//! Integration tests: real adapters against a local fixture server, and
//! full refresh cycles through the engine service.

mod endpoints;
mod fixture;
mod mock_provider;
mod refresh_cycle;
