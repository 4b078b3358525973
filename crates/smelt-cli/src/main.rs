use smelt::{
    Buffered, Chunk, FileRecord, Pipeline, PipelineError, SinkOptions, TaskError, TaskHandler,
    TaskRunner, source,
};
use smelt_cli::run_cli;
use std::process::ExitCode;

const README: &str = "
Nice, you ran smelt! Don't forget that you can get a task list
by running the following:

    $ smelt --list
";

fn main() -> ExitCode {
    match demo_tasks() {
        Ok(runner) => run_cli(runner, std::env::args_os()),
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn demo_tasks() -> Result<TaskRunner, TaskError> {
    let mut runner = TaskRunner::new();
    runner
        .task(
            "hello",
            Vec::<String>::new(),
            TaskHandler::action(|| println!("Hello")),
        )?
        .task("world", ["hello"], TaskHandler::action(|| println!("World")))?
        .task(
            "readme",
            Vec::<String>::new(),
            TaskHandler::action(|| println!("{README}")),
        )?
        .group("default", ["world", "readme"])?
        .task("build", Vec::<String>::new(), TaskHandler::pipeline(build_site))?;
    Ok(runner)
}

fn build_site() -> Pipeline {
    source(["assets/**/*"])
        .pipe(Buffered::new("markdown", markdown_to_html))
        .dest("build", SinkOptions::default())
}

/// Renders headings and paragraphs of `.md` files as HTML and renames them
/// to `.html`. Other files pass through unchanged.
fn markdown_to_html(file: &FileRecord, bytes: Chunk) -> Result<Chunk, PipelineError> {
    let name = file.name();
    let Some(stem) = name.strip_suffix(".md") else {
        return Ok(bytes);
    };
    let text = String::from_utf8(bytes)
        .map_err(|error| PipelineError::stage("markdown", format!("{name}: {error}")))?;
    file.set_name(format!("{stem}.html"));

    let mut html = String::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let level = line.chars().take_while(|c| *c == '#').count();
        match line[level..].strip_prefix(' ') {
            Some(heading) if (1..=6).contains(&level) => {
                html.push_str(&format!("<h{level}>{heading}</h{level}>\n"));
            }
            _ => html.push_str(&format!("<p>{line}</p>\n")),
        }
    }
    Ok(html.into_bytes())
}
