//! Candidate path construction.
//!
//! SG files for one recording live at predictable mount points, e.g.
//! `/mnt/disks/3/7/data/exp042.vdif` for module 3, disk 7. The caller
//! supplies a C-style format template with exactly two integer fields and
//! one string field in that order — `/mnt/disks/%d/%d/data/%s` — and the
//! plan builders render it over every (module, disk) pair.

use anyhow::{bail, Result};
use std::fmt::Write as _;
use std::path::PathBuf;

/// A parsed `%d…%d…%s` path template.
///
/// `%%` escapes a literal percent sign. Any other directive, a missing
/// field, or fields out of order is a construction error.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    /// Literal text around the three fields: `lit[0] %d lit[1] %d lit[2] %s lit[3]`.
    literals: [String; 4],
}

impl PathTemplate {
    /// Parses `template`, validating the field layout.
    pub fn parse(template: &str) -> Result<Self> {
        let mut literals: [String; 4] = Default::default();
        let mut field = 0usize;
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                literals[field].push(c);
                continue;
            }
            match chars.next() {
                Some('%') => literals[field].push('%'),
                Some('d') if field < 2 => field += 1,
                Some('s') if field == 2 => field += 1,
                Some(other) => bail!(
                    "unexpected %{} in path template {:?} (expected %d %d %s)",
                    other,
                    template
                ),
                None => bail!("dangling % in path template {:?}", template),
            }
        }
        if field != 3 {
            bail!(
                "path template {:?} must contain %d, %d, %s in order",
                template
            );
        }
        Ok(Self { literals })
    }

    /// Renders the template for one (module, disk, pattern) triple.
    #[must_use]
    pub fn render(&self, module: u32, disk: u32, pattern: &str) -> PathBuf {
        let mut out = String::with_capacity(
            self.literals.iter().map(String::len).sum::<usize>() + pattern.len() + 8,
        );
        out.push_str(&self.literals[0]);
        let _ = write!(out, "{}", module);
        out.push_str(&self.literals[1]);
        let _ = write!(out, "{}", disk);
        out.push_str(&self.literals[2]);
        out.push_str(pattern);
        out.push_str(&self.literals[3]);
        PathBuf::from(out)
    }

    /// Renders every (module, disk) candidate, modules outermost.
    #[must_use]
    pub fn candidates(&self, pattern: &str, modules: &[u32], disks: &[u32]) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(modules.len() * disks.len());
        for &module in modules {
            for &disk in disks {
                paths.push(self.render(module, disk, pattern));
            }
        }
        paths
    }
}
