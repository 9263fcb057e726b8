use serde::{Deserialize, Serialize};

/// Configuration of the reserved placeholder glyph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Reserved character whose runs form placeholders
    pub glyph: char,

    /// Run length of a signature marker
    pub signature_run: usize,

    /// Run length of a plain fill-in field (no binding)
    pub fill_in_run: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            glyph: '_',
            signature_run: 20,
            fill_in_run: 10,
        }
    }
}

impl MarkerConfig {
    /// The literal text of one signature marker
    #[must_use]
    pub fn signature_marker(&self) -> String {
        self.glyph.to_string().repeat(self.signature_run)
    }

    /// The literal text of one fill-in field
    #[must_use]
    pub fn fill_in_marker(&self) -> String {
        self.glyph.to_string().repeat(self.fill_in_run)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.signature_run == 0 {
            return Err("signature_run must be > 0".to_string());
        }

        if self.fill_in_run == 0 {
            return Err("fill_in_run must be > 0".to_string());
        }

        if self.signature_run == self.fill_in_run {
            return Err(format!(
                "signature_run ({}) and fill_in_run ({}) must differ",
                self.signature_run, self.fill_in_run
            ));
        }

        if self.glyph.is_whitespace() || self.glyph.is_control() {
            return Err(format!("glyph {:?} cannot be whitespace or control", self.glyph));
        }

        Ok(())
    }
}
