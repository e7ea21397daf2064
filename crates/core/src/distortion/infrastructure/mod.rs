pub mod cpu_bulge_distorter;
pub mod distorter_factory;
pub mod gpu_bulge_distorter;
pub mod gpu_context;
