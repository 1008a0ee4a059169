use std::time::Duration;

/// Configuration for the blob-backed provider
#[derive(Debug, Clone)]
pub struct BlobProviderConfig {
    /// Public prefix of every access URL, without trailing slash
    pub base_url: String,

    /// If size >= this, hand out a multipart upload instead of a single PUT
    pub multipart_threshold_bytes: u64,

    /// Rules for part-based uploads
    pub upload_rules: UploadRules,

    /// Lifetime of every signed PUT URL
    pub signed_url_ttl: Duration,
}

impl Default for BlobProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/files".to_string(),
            multipart_threshold_bytes: 10 * 1024 * 1024, // 10MB
            upload_rules: UploadRules::default(),
            signed_url_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Rules for multipart uploads
#[derive(Debug, Clone)]
pub struct UploadRules {
    /// Standard part size (bytes). Raised automatically when a file would need more than `max_parts`.
    pub part_size: u64,

    /// Upper bound to protect memory/state
    pub max_parts: u32,

    /// How many part URLs `request_upload` signs up front; the rest are requested later
    pub presign_batch: u32,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            part_size: 5 * 1024 * 1024, // 5MB
            max_parts: 10_000,
            presign_batch: 100,
        }
    }
}

impl BlobProviderConfig {
    /// Create a new config with defaults
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Set multipart threshold
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold_bytes = bytes;
        self
    }

    /// Set upload rules
    pub fn with_upload_rules(mut self, rules: UploadRules) -> Self {
        self.upload_rules = rules;
        self
    }

    pub fn with_signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    /// Part size and part count for a file of `size` bytes.
    pub fn plan_parts(&self, size: u64) -> (u64, u32) {
        let rules = &self.upload_rules;
        let max_parts = u64::from(rules.max_parts.max(1));
        let mut part_size = rules.part_size.max(1);
        if size.div_ceil(part_size) > max_parts {
            part_size = size.div_ceil(max_parts);
        }
        let total = size.div_ceil(part_size).max(1);
        (part_size, total as u32)
    }
}

impl UploadRules {
    /// Create new upload rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Set part size
    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    /// Set max parts
    pub fn with_max_parts(mut self, max: u32) -> Self {
        self.max_parts = max;
        self
    }

    pub fn with_presign_batch(mut self, batch: u32) -> Self {
        self.presign_batch = batch;
        self
    }
}
