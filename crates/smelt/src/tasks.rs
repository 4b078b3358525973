use crate::{HandlerError, Pipeline, TaskError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info};

pub const DEFAULT_TASK: &str = "default";

/// What a task does once its dependencies have run.
pub enum TaskHandler {
    /// Groups dependencies without doing anything itself.
    NoOp,
    Action(Box<dyn FnMut()>),
    Fallible(Box<dyn FnMut() -> Result<(), HandlerError>>),
    /// Builds a fresh pipeline which the runner drives to completion.
    Pipeline(Box<dyn FnMut() -> Pipeline>),
}

impl TaskHandler {
    pub fn action(action: impl FnMut() + 'static) -> Self {
        Self::Action(Box::new(action))
    }

    pub fn fallible(action: impl FnMut() -> Result<(), HandlerError> + 'static) -> Self {
        Self::Fallible(Box::new(action))
    }

    pub fn pipeline(build: impl FnMut() -> Pipeline + 'static) -> Self {
        Self::Pipeline(Box::new(build))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::Action(_) => "action",
            Self::Fallible(_) => "fallible",
            Self::Pipeline(_) => "pipeline",
        }
    }
}

struct Task {
    dependencies: Vec<String>,
    handler: TaskHandler,
}

/// Named tasks with dependencies, run depth first.
#[derive(Default)]
pub struct TaskRunner {
    tasks: BTreeMap<String, Task>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task. Dependencies may name tasks registered later.
    pub fn task<I, S>(
        &mut self,
        name: impl Into<String>,
        dependencies: I,
        handler: TaskHandler,
    ) -> Result<&mut Self, TaskError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(TaskError::DuplicateTask(name));
        }
        let dependencies = dependencies.into_iter().map(Into::into).collect();
        self.tasks.insert(
            name,
            Task {
                dependencies,
                handler,
            },
        );
        Ok(self)
    }

    /// Registers a task that only runs its dependencies.
    pub fn group<I, S>(&mut self, name: impl Into<String>, dependencies: I) -> Result<&mut Self, TaskError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task(name, dependencies, TaskHandler::NoOp)
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.tasks.get(name).map(|task| task.dependencies.as_slice())
    }

    pub fn handler_kind(&self, name: &str) -> Option<&'static str> {
        self.tasks.get(name).map(|task| task.handler.kind())
    }

    pub fn run(&mut self) -> Result<(), TaskError> {
        self.run_task(DEFAULT_TASK)
    }

    /// Runs `name` after its dependencies. Every task reachable from `name`
    /// runs at most once per call, and the first failure stops the run.
    pub fn run_task(&mut self, name: &str) -> Result<(), TaskError> {
        let mut visiting = Vec::new();
        let mut completed = BTreeSet::new();
        self.visit(name, &mut visiting, &mut completed)
    }

    fn visit(
        &mut self,
        name: &str,
        visiting: &mut Vec<String>,
        completed: &mut BTreeSet<String>,
    ) -> Result<(), TaskError> {
        if completed.contains(name) {
            return Ok(());
        }
        if let Some(position) = visiting.iter().position(|visited| visited == name) {
            let mut cycle = visiting[position..].to_vec();
            cycle.push(name.to_string());
            return Err(TaskError::DependencyCycle(cycle));
        }

        let dependencies = self
            .tasks
            .get(name)
            .map(|task| task.dependencies.clone())
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;

        visiting.push(name.to_string());
        for dependency in &dependencies {
            self.visit(dependency, visiting, completed)?;
        }
        visiting.pop();

        self.execute(name)?;
        completed.insert(name.to_string());
        Ok(())
    }

    fn execute(&mut self, name: &str) -> Result<(), TaskError> {
        let task = self
            .tasks
            .get_mut(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;

        info!(task = name, "starting");
        let result = match &mut task.handler {
            TaskHandler::NoOp => Ok(()),
            TaskHandler::Action(action) => {
                action();
                Ok(())
            }
            TaskHandler::Fallible(action) => action().map_err(|source| TaskError::Handler {
                task: name.to_string(),
                source,
            }),
            TaskHandler::Pipeline(build) => {
                build().drive().map_err(|source| TaskError::Pipeline {
                    task: name.to_string(),
                    source,
                })
            }
        };

        match &result {
            Ok(()) => info!(task = name, "complete"),
            Err(failure) => error!(task = name, error = %failure, "error"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Collector, MockStage};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex, PoisonError};

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording(log: &Log, name: &'static str) -> TaskHandler {
        let log = log.clone();
        TaskHandler::action(move || log.borrow_mut().push(name.to_string()))
    }

    #[test]
    fn task_duplicate_name_expected_error() {
        let mut runner = TaskRunner::new();
        runner
            .task("build", Vec::<String>::new(), TaskHandler::NoOp)
            .expect("first registration should succeed");

        let error = runner
            .task("build", Vec::<String>::new(), TaskHandler::NoOp)
            .err()
            .expect("duplicate should fail");

        assert_eq!(error.to_string(), "task 'build' already exists");
    }

    #[test]
    fn run_task_unknown_expected_does_not_exist_error() {
        let mut runner = TaskRunner::new();
        let error = runner.run_task("missing").expect_err("unknown task should fail");
        assert_eq!(error.to_string(), "task 'missing' does not exist");
    }

    #[test]
    fn run_task_unknown_dependency_expected_does_not_exist_error() {
        let mut runner = TaskRunner::new();
        runner.group("a", ["ghost"]).expect("register");
        let error = runner.run_task("a").expect_err("missing dependency should fail");
        assert!(matches!(error, TaskError::UnknownTask(name) if name == "ghost"));
    }

    #[test]
    fn run_task_dependencies_expected_depth_first_order() {
        let log = Log::default();
        let mut runner = TaskRunner::new();
        runner
            .task("hello", Vec::<String>::new(), recording(&log, "hello"))
            .expect("register")
            .task("world", ["hello"], recording(&log, "world"))
            .expect("register")
            .task("readme", Vec::<String>::new(), recording(&log, "readme"))
            .expect("register")
            .group("default", ["world", "readme"])
            .expect("register");

        runner.run().expect("default should run");

        assert_eq!(*log.borrow(), vec!["hello", "world", "readme"]);
    }

    #[test]
    fn run_task_shared_dependency_expected_runs_once() {
        let log = Log::default();
        let mut runner = TaskRunner::new();
        runner
            .task("shared", Vec::<String>::new(), recording(&log, "shared"))
            .expect("register")
            .task("left", ["shared"], recording(&log, "left"))
            .expect("register")
            .task("right", ["shared"], recording(&log, "right"))
            .expect("register")
            .group("all", ["left", "right"])
            .expect("register");

        runner.run_task("all").expect("run should succeed");

        assert_eq!(*log.borrow(), vec!["shared", "left", "right"]);
    }

    #[test]
    fn run_task_twice_expected_tasks_rerun_each_invocation() {
        let log = Log::default();
        let mut runner = TaskRunner::new();
        runner
            .task("once", Vec::<String>::new(), recording(&log, "once"))
            .expect("register");

        runner.run_task("once").expect("first run");
        runner.run_task("once").expect("second run");

        assert_eq!(log.borrow().len(), 2);
    }

    fn cycle_reported(edges: &[(&str, &str)]) -> Vec<String> {
        let mut runner = TaskRunner::new();
        for (name, dependency) in edges {
            runner.group(*name, [*dependency]).expect("register");
        }
        match runner.run_task("a") {
            Err(TaskError::DependencyCycle(cycle)) => cycle,
            other => panic!("expected a dependency cycle, got {:?}", other.err()),
        }
    }

    #[test]
    fn run_task_dependency_cycles_expected_cycle_error() {
        assert_eq!(cycle_reported(&[("a", "a")]), vec!["a", "a"]);
        assert_eq!(cycle_reported(&[("a", "b"), ("b", "a")]), vec!["a", "b", "a"]);
        assert_eq!(
            cycle_reported(&[("a", "b"), ("b", "c"), ("c", "a")]),
            vec!["a", "b", "c", "a"]
        );
    }

    #[test]
    fn run_task_failing_dependency_expected_dependent_not_run() {
        let log = Log::default();
        let mut runner = TaskRunner::new();
        runner
            .task(
                "broken",
                Vec::<String>::new(),
                TaskHandler::fallible(|| Err("disk on fire".into())),
            )
            .expect("register")
            .task("after", ["broken"], recording(&log, "after"))
            .expect("register");

        let error = runner.run_task("after").expect_err("dependency should fail");

        assert_eq!(error.to_string(), "task 'broken' failed: disk on fire");
        let cause = std::error::Error::source(&error).expect("handler error should be kept");
        assert_eq!(cause.to_string(), "disk on fire");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn run_task_pipeline_handler_expected_pipeline_driven() {
        let collector = Collector::new();
        let sink = collector.clone();
        let mut runner = TaskRunner::new();
        runner
            .task(
                "copy",
                Vec::<String>::new(),
                TaskHandler::pipeline(move || {
                    Pipeline::default()
                        .pipe(MockStage::new(["a", "b"]))
                        .pipe(sink.clone())
                }),
            )
            .expect("register");

        runner.run_task("copy").expect("pipeline should drive");

        assert_eq!(collector.eof_names(), vec!["a", "b"]);
        assert_eq!(runner.handler_kind("copy"), Some("pipeline"));
    }

    #[test]
    fn run_task_failing_pipeline_expected_pipeline_error() {
        let mut runner = TaskRunner::new();
        runner
            .task(
                "copy",
                Vec::<String>::new(),
                TaskHandler::pipeline(|| {
                    Pipeline::default().pipe(MockStage::new(["a"]).with_contents(["error: bad"]))
                }),
            )
            .expect("register");

        let error = runner.run_task("copy").expect_err("pipeline should fail");

        assert!(matches!(error, TaskError::Pipeline { ref task, .. } if task == "copy"));
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn run_task_logging_expected_starting_complete_and_error_events() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut runner = TaskRunner::new();
        runner
            .group("ok", Vec::<String>::new())
            .expect("register")
            .task(
                "bad",
                Vec::<String>::new(),
                TaskHandler::fallible(|| Err("nope".into())),
            )
            .expect("register");

        tracing::subscriber::with_default(subscriber, || {
            runner.run_task("ok").expect("ok should run");
            runner.run_task("bad").expect_err("bad should fail");
        });

        let output = buffer.contents();
        assert!(output.contains("starting task=\"ok\""));
        assert!(output.contains("complete task=\"ok\""));
        assert!(output.contains("ERROR"));
        assert!(output.contains("task 'bad' failed: nope"));
    }
}
