#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use scroll_vision::refinement::transport::ImagePayload;
use scroll_vision::{Analyzer, ResponseFormat, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

pub const BACKGROUND: Rgba<u8> = Rgba([248, 248, 248, 255]);

/// A flat screenshot with textured content in each `[start, end)` row range.
pub fn screenshot(width: u32, height: u32, blocks: &[(u32, u32)]) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if blocks.iter().any(|&(start, end)| (start..end).contains(&y)) {
            Rgba([
                ((x * 7 + y * 3) % 256) as u8,
                ((x * 13) % 256) as u8,
                ((y * 5 + x) % 256) as u8,
                255,
            ])
        } else {
            BACKGROUND
        }
    })
}

#[derive(Debug, Clone)]
pub struct Call {
    pub instruction: String,
    pub images: usize,
    pub format: ResponseFormat,
    pub at: Instant,
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Collaborator double: answers from a closure and records every call.
pub struct FakeAnalyzer {
    responder: Responder,
    calls: Mutex<Vec<Call>>,
}

impl FakeAnalyzer {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replays `responses` in order, one per call.
    pub fn scripted(responses: Vec<Result<String>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .expect("more collaborator calls than scripted responses")
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, images: &[ImagePayload], instruction: &str, format: ResponseFormat) -> Result<String> {
        self.calls.lock().unwrap().push(Call {
            instruction: instruction.to_string(),
            images: images.len(),
            format,
            at: Instant::now(),
        });
        (self.responder)(instruction)
    }
}

/// Parses the trailing "Upper region: segments a,b" / "Lower region: ..." lines.
pub fn region_indices(instruction: &str) -> (Vec<usize>, Vec<usize>) {
    let parse = |prefix: &str| -> Vec<usize> {
        instruction
            .lines()
            .find_map(|line| line.strip_prefix(prefix))
            .map(|list| list.split(',').filter_map(|n| n.trim().parse().ok()).collect())
            .unwrap_or_default()
    };
    (parse("Upper region: segments "), parse("Lower region: segments "))
}
