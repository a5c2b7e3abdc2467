use std::{collections::HashSet, fs};

use tagglue::{
    boundary::BoundaryMarshaler,
    cl_backend::GlueModule,
    error::{
        InternalError, LayoutError, ariadne_renderer::AriadneRenderer, context::Context,
    },
    glue, input,
    layout::LayoutCache,
};
use tracing::info;

use crate::Cli;

/// Run the pipeline. Returns the number of reported errors.
pub fn run(cli: &Cli) -> Result<usize, InternalError> {
    let mut ctx = Context::init(Box::new(AriadneRenderer::new()));

    let Some(prog) = input::parse_file(&mut ctx, &cli.input)? else {
        return ctx.finish();
    };

    let target = cli.target_info();
    let cache = LayoutCache::new(&prog.env, target);
    let mut reported = Reported::default();

    let mut glue_sets = vec![];
    for (_, result) in cache.compute_all() {
        match result {
            Ok(layout) => {
                if cli.print_layouts {
                    print!("{layout}");
                }
                glue_sets.push(glue::generate(layout, target.endianness)?);
            }
            Err(err) => reported.report(&mut ctx, err),
        }
    }

    if cli.print_glue {
        for f in glue_sets.iter().flat_map(|g| g.functions()) {
            print!("{f}");
        }
    }

    let marshaler = BoundaryMarshaler::new(cli.convention(), &cache);
    let mut plans = vec![];
    for entry in &prog.entry_points {
        match marshaler.plan(entry) {
            Ok(plan) => plans.push(plan),
            Err(err) => reported.report(&mut ctx, err),
        }
    }

    if let Some(path) = &cli.emit
        && ctx.error_count() == 0
    {
        let mut module = GlueModule::new(&cli.target)?;
        for glue in &glue_sets {
            module.define_glue(glue)?;
        }
        for plan in &plans {
            module.define_thunk(plan, target.endianness)?;
        }
        fs::write(path, module.finish()?)?;
        info!(path = %path.display(), "wrote object file");
    }

    ctx.finish()
}

/// Reports each distinct error once.
///
/// A failing type makes every type and entry point that embeds it fail with
/// the same error.
#[derive(Default)]
struct Reported(HashSet<(String, usize, usize)>);

impl Reported {
    fn report(&mut self, ctx: &mut Context, err: LayoutError) {
        let pos = err.pos();
        if self.0.insert((err.to_string(), pos.start, pos.end)) {
            ctx.report(err.into());
        }
    }
}
