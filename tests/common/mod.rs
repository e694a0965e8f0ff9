use async_trait::async_trait;
use chorus::TextItem;
use chorus::vector::{EmbeddingService, ServiceError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const THEMES: [&[&str]; 3] = [
    &["summer", "beach", "sunshine"],
    &["miss", "funeral", "grief"],
    &["dance", "party", "club"],
];

/// Embeds text onto one axis per theme keyword group.
pub struct ThemeEmbeddingService {
    calls: AtomicUsize,
    fail_calls: Mutex<Vec<usize>>,
}

impl ThemeEmbeddingService {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_calls: Mutex::new(Vec::new()),
        }
    }

    /// Requests with these zero-based call numbers fail with a server error.
    pub fn failing_on(calls: &[usize]) -> Self {
        let service = Self::new();
        *service.fail_calls.lock().unwrap() = calls.to_vec();
        service
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = THEMES
            .iter()
            .map(|words| {
                if words.iter().any(|word| lower.contains(word)) {
                    1.0
                } else {
                    0.02
                }
            })
            .collect();
        vector.push((text.len() % 5) as f32 * 0.01);
        vector
    }
}

#[async_trait]
impl EmbeddingService for ThemeEmbeddingService {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_calls.lock().unwrap().contains(&call) {
            return Err(ServiceError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(texts.iter().map(|text| Self::embed(text)).collect())
    }

    fn model_name(&self) -> &str {
        "theme-axes"
    }
}

/// `per_theme` comments for each theme, interleaved.
pub fn themed_items(per_theme: usize) -> Vec<TextItem> {
    let phrases = [
        "that summer at the beach with sunshine",
        "i miss her, played this at the funeral",
        "dance all night, best party song in the club",
    ];
    (0..per_theme * phrases.len())
        .map(|i| {
            TextItem::new(
                format!("c{i}"),
                format!("{} #{i}", phrases[i % phrases.len()]),
            )
        })
        .collect()
}
