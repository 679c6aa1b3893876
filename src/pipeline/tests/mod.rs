//! Pipeline tests

mod support;
