//! Video scoring pipeline for deepfake detection.
//!
//! A video is decoded into an ordered stream of frames, each frame is
//! resized and normalized into a classifier tensor, an opaque
//! [`FrameScorer`](scoring::domain::frame_scorer::FrameScorer) assigns it a
//! probability of being synthetic, and the per-frame scores are reduced to a
//! single [`DetectionResult`](verdict::domain::detection_result::DetectionResult).

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod frame_tensor;
    pub mod model_resolver;
    pub mod scan_error;
    pub mod video_metadata;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
        pub mod video_reader;
    }
    pub mod infrastructure;
}

pub mod scoring {
    pub mod domain {
        pub mod frame_preprocessor;
        pub mod frame_scorer;
    }
    pub mod infrastructure;
}

pub mod verdict {
    pub mod domain {
        pub mod detection_result;
        pub mod score_aggregator;
    }
}

pub mod pipeline {
    pub mod infrastructure;
    pub mod pipeline_executor;
    pub mod pipeline_logger;
    pub mod scan_options;
    pub mod scan_video_use_case;
}
