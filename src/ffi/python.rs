// In: src/ffi/python.rs

use parking_lot::Mutex;
use pyo3::prelude::*;
use std::path::Path;

use crate::bridge::Wrapper;
use crate::config::HostEnvironment;
use crate::error::MeterlineError;

//==================================================================================
// I. The Pipeline Service (one Wrapper per Python object)
//==================================================================================

/// Python face of the `Wrapper`. Every method returns a boolean or a string;
/// failures are reported through the log.
#[pyclass(name = "PipelineService", module = "meterline")]
pub struct PyPipelineService {
    inner: Mutex<Wrapper>,
}

#[pymethods]
impl PyPipelineService {
    #[new]
    fn new() -> Self {
        Self {
            inner: Mutex::new(Wrapper::new()),
        }
    }

    /// Builds the pipeline from a JSON configuration and the host handles.
    /// `config=None` is treated as an empty document.
    #[pyo3(signature = (config = None, vm = 0, instance = 0, class = 0, method = 0, version = 0))]
    fn create(
        &self,
        py: Python<'_>,
        config: Option<&str>,
        vm: u64,
        instance: u64,
        class: u64,
        method: u64,
        version: i32,
    ) -> bool {
        let config = config.unwrap_or("{}");
        let host = HostEnvironment::new(vm, instance, class, method, version);
        py.allow_threads(|| self.inner.lock().create(config, host))
    }

    fn start(&self) -> bool {
        self.inner.lock().start()
    }

    fn stop(&self) -> bool {
        self.inner.lock().stop()
    }

    /// Blocks until every worker has exited. The GIL is released meanwhile.
    fn terminate(&self, py: Python<'_>) -> bool {
        py.allow_threads(|| self.inner.lock().terminate())
    }

    fn destroy(&self, py: Python<'_>) -> bool {
        py.allow_threads(|| self.inner.lock().destroy())
    }

    #[pyo3(signature = (config = None, vm = 0, instance = 0, class = 0, method = 0, version = 0))]
    fn reset(
        &self,
        py: Python<'_>,
        config: Option<&str>,
        vm: u64,
        instance: u64,
        class: u64,
        method: u64,
        version: i32,
    ) -> bool {
        let config = config.unwrap_or("{}");
        let host = HostEnvironment::new(vm, instance, class, method, version);
        py.allow_threads(|| self.inner.lock().reset(config, host))
    }

    fn exists(&self) -> bool {
        self.inner.lock().exists()
    }

    fn is_started(&self) -> bool {
        self.inner.lock().is_started()
    }

    fn query_state(&self) -> String {
        self.inner.lock().query_state()
    }

    fn get_running_time(&self) -> String {
        self.inner.lock().get_running_time()
    }

    fn __repr__(&self) -> String {
        format!("PipelineService(state={})", self.inner.lock().query_state())
    }
}

//==================================================================================
// II. Logging
//==================================================================================

/// Installs the process logger at info level, optionally appending to a file.
/// Returns `False` if a logger was already installed.
#[pyfunction]
#[pyo3(name = "enable_verbose_logging")]
pub fn enable_verbose_logging_py(log_file: Option<String>) -> PyResult<bool> {
    crate::observability::enable_verbose_logging(log_file.as_deref().map(Path::new))
        .map_err(|err| MeterlineError::from(err).into())
}
