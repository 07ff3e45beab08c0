// SPDX-License-Identifier: MIT

//! Canvas loader - YAML/JSON file loading and parsing
//!
//! This module handles loading canvas definitions from files, used by the
//! CLI and the server to seed the canvas store.

use super::types::CanvasData;
use crate::error::Result;
use std::fs;
use std::path::Path;

/// Loads canvas definitions from YAML or JSON files
pub struct CanvasLoader;

impl CanvasLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a canvas definition from a file; JSON for `.json`, YAML otherwise
    pub fn load_canvas<P: AsRef<Path>>(&self, path: P) -> Result<CanvasData> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    /// Parse a canvas definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<CanvasData> {
        let canvas: CanvasData = serde_yaml::from_str(content)?;
        Ok(canvas)
    }

    /// Parse a canvas definition from a JSON string
    pub fn parse_json(content: &str) -> Result<CanvasData> {
        let canvas: CanvasData = serde_json::from_str(content)?;
        Ok(canvas)
    }
}

impl Default for CanvasLoader {
    fn default() -> Self {
        Self::new()
    }
}
