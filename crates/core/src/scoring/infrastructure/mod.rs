pub mod execution_provider;
pub mod onnx_frame_scorer;
pub mod scorer_cache;
