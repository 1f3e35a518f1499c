use crate::config::{self, RuleGroup, UnitConfig};
use crate::stats::Stats;
use crate::{naming, read, transform, validate, write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Month '{month}' is invalid, expected 1-12, 01-09, '年终奖' or '补偿金'")]
    InvalidMonth { month: String },
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Read(#[from] read::Error),
    #[error(transparent)]
    Validate(#[from] validate::Error),
    #[error(transparent)]
    Transform(#[from] transform::Error),
    #[error(transparent)]
    Write(#[from] write::Error),
    #[error(transparent)]
    Naming(#[from] naming::Error),
    #[error("Could not create output directory '{}'", path.display())]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Options {
    pub output_dir: PathBuf,
    /// See [`naming::format()`] for the placeholders.
    pub filename_template: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            output_dir: PathBuf::from("output"),
            filename_template: naming::DEFAULT_TEMPLATE.into(),
        }
    }
}

/// One written file.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub path: PathBuf,
    pub rule_group: String,
    pub stats: Stats,
}

/// What one run knows about while processing its groups.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub unit: &'a UnitConfig,
    pub month: &'a str,
    pub options: &'a Options,
}

/// Accept `1` to `12`, their zero-padded forms, and the bonus and compensation labels.
pub fn validate_month(month: &str) -> Result<&str, Error> {
    if month == config::BONUS_MONTH || month == config::COMPENSATION_MONTH {
        return Ok(month);
    }
    let valid = (1..=2).contains(&month.len())
        && month.bytes().all(|b| b.is_ascii_digit())
        && month.parse::<u8>().is_ok_and(|n| (1..=12).contains(&n));
    if valid {
        Ok(month)
    } else {
        Err(Error::InvalidMonth {
            month: month.into(),
        })
    }
}

/// Validate, transform and write `rows` with `group` into `template`.
pub fn process_group(
    ctx: Context<'_>,
    rule_group: &str,
    group: &RuleGroup,
    mut rows: Vec<crate::value::Row>,
    template: &Path,
    template_name: &str,
) -> Result<Output, Error> {
    tracing::info!(unit = %ctx.unit.name, %rule_group, template = %template.display(), rows = rows.len(), "processing group");
    if !group.validation_rules.is_empty() {
        validate::validate_rows(&rows, &group.validation_rules)?;
        tracing::info!(%rule_group, "validation passed");
    }
    if transform::needs_transformations(&group.field_mappings) {
        transform::apply(&mut rows, &group.field_mappings, &group.transformations)?;
        tracing::info!(%rule_group, "transformation done");
    }

    let stats = crate::stats::calculate(&rows, group);
    let ext = template
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let file_name = naming::format(
        &ctx.options.filename_template,
        &naming::Fields {
            unit_name: &ctx.unit.name,
            template_name,
            month: ctx.month,
            count: stats.count,
            amount: stats.amount,
            ext: &ext,
        },
    )?;
    std::fs::create_dir_all(&ctx.options.output_dir).map_err(|source| Error::CreateOutputDir {
        path: ctx.options.output_dir.clone(),
        source,
    })?;
    let path = ctx.options.output_dir.join(file_name);
    crate::write(write::Request {
        template,
        output: &path,
        rows: &rows,
        group,
        month: write::Month::Param(ctx.month),
    })?;
    Ok(Output {
        path,
        rule_group: rule_group.into(),
        stats,
    })
}

pub(crate) mod function {
    use super::{process_group, validate_month, Context, Error, Options, Output};
    use crate::config::{self, Config};
    use crate::{read, stats};
    use std::path::Path;

    /// Process the input file at `input` for `unit_name` and `month`, writing one file per
    /// non-empty group into the output directory of `options`.
    pub fn run(
        input: &Path,
        unit_name: &str,
        month: &str,
        config: &Config,
        options: &Options,
    ) -> Result<Vec<Output>, Error> {
        let month = validate_month(month)?;
        let unit = config.unit(unit_name)?;
        let default = unit.default_group();
        tracing::info!(input = %input.display(), unit = %unit_name, %month, "processing input");

        let mut rows = crate::read_rows(input, &read::Options::from(default))?;
        if let Some(filter) = &default.zero_amount_filter {
            rows = stats::filter_zero_amounts(rows, &filter.column)?;
        }

        let ctx = Context {
            unit,
            month,
            options,
        };
        let mut outputs = Vec::new();
        if !unit.selector.enabled {
            tracing::info!("template selection is disabled, using the default template");
            outputs.push(process_group(
                ctx,
                config::DEFAULT_RULE_GROUP,
                default,
                rows,
                &default.template_path,
                &default.template_stem(),
            )?);
        } else {
            let groups = crate::group_data(rows, unit)?;
            for group in [groups.default, groups.special] {
                if group.rows.is_empty() {
                    tracing::info!(rule_group = %group.rule_group, "skipping empty group");
                    continue;
                }
                let rule_group = unit.rule_group(&group.rule_group);
                outputs.push(process_group(
                    ctx,
                    &group.rule_group,
                    rule_group,
                    group.rows,
                    &group.template,
                    &group.name,
                )?);
            }
        }
        for output in &outputs {
            tracing::info!(output = %output.path.display(), count = output.stats.count, amount = output.stats.amount, "done");
        }
        Ok(outputs)
    }
}
