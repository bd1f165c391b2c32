//! Integration tests for IncidentHub
//!
//! These tests verify the behavior of the API endpoints and the audit
//! pipeline with a real (temporary) database and all middleware.

mod audit_pipeline_tests;
