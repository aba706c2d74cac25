//! End-to-end tests for ubflow live under `tests/`.
