pub mod deferred_detector;
pub mod model_loader;
pub mod onnx_blazeface_detector;
pub mod onnx_face_landmarker;
pub mod onnx_session;
