use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::db::{queries, Db};
use crate::models::{Package, PackageType};

// An alias applies only while its canonical package exists.
pub const PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("v-vip", "VVIP Package"),
    ("v vip", "VVIP Package"),
    ("vvip", "VVIP Package"),
    ("double vip", "VVIP Package"),
    ("vip", "VIP Package"),
    ("gold one", "Gold Package"),
    ("golden", "Gold Package"),
    ("silver one", "Silver Package"),
    ("basic", "Basic Package"),
    ("starter", "Basic Package"),
    ("family shoot", "Family Package"),
    ("maternity shoot", "Maternity Package"),
    ("outdoor shoot", "Outdoor Package"),
];

pub struct PackageCatalog {
    ttl: Duration,
    cached: RwLock<Option<(Instant, Arc<Vec<Package>>)>>,
}

impl PackageCatalog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub fn packages(&self, db: &Db) -> anyhow::Result<Arc<Vec<Package>>> {
        if let Ok(guard) = self.cached.read() {
            if let Some((loaded_at, packages)) = guard.as_ref() {
                if loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(packages));
                }
            }
        }

        let packages = Arc::new(db.call(queries::list_packages)?);
        tracing::debug!(count = packages.len(), "package catalog refreshed");
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some((Instant::now(), Arc::clone(&packages)));
        }
        Ok(packages)
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.write() {
            *guard = None;
        }
    }
}

fn core_name(name: &str) -> String {
    let lower = name.to_lowercase();
    lower
        .strip_suffix(" package")
        .map(str::to_string)
        .unwrap_or(lower)
}

fn search_terms(packages: &[Package]) -> Vec<(String, usize)> {
    let mut terms = Vec::new();
    for (i, p) in packages.iter().enumerate() {
        terms.push((p.name.to_lowercase(), i));
        let core = core_name(&p.name);
        if !core.is_empty() {
            terms.push((core, i));
        }
    }
    for (alias, canonical) in PACKAGE_ALIASES {
        if let Some(i) = packages
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(canonical))
        {
            terms.push((alias.to_string(), i));
        }
    }
    // longest phrase claims its span first, so "v-vip" is not read as "vip"
    terms.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    terms
}

struct TermMatcher {
    names: Vec<String>,
    re: Regex,
    index: HashMap<String, usize>,
}

impl TermMatcher {
    fn build(packages: &[Package]) -> Option<Self> {
        let terms = search_terms(packages);
        if terms.is_empty() {
            return None;
        }
        let alternation: Vec<String> = terms.iter().map(|(t, _)| regex::escape(t)).collect();
        let re = Regex::new(&format!(r"(?i)\b(?:{})\b", alternation.join("|"))).ok()?;
        let mut index = HashMap::new();
        for (term, i) in terms {
            index.entry(term).or_insert(i);
        }
        Some(Self {
            names: packages.iter().map(|p| p.name.clone()).collect(),
            re,
            index,
        })
    }

    fn is_for(&self, packages: &[Package]) -> bool {
        self.names.len() == packages.len()
            && self.names.iter().zip(packages).all(|(n, p)| *n == p.name)
    }
}

static MATCHER: LazyLock<RwLock<Option<Arc<TermMatcher>>>> = LazyLock::new(|| RwLock::new(None));

fn matcher_for(packages: &[Package]) -> Option<Arc<TermMatcher>> {
    if let Ok(guard) = MATCHER.read() {
        if let Some(m) = guard.as_ref().filter(|m| m.is_for(packages)) {
            return Some(Arc::clone(m));
        }
    }
    let built = Arc::new(TermMatcher::build(packages)?);
    if let Ok(mut guard) = MATCHER.write() {
        *guard = Some(Arc::clone(&built));
    }
    Some(built)
}

pub fn mentioned_packages<'a>(text: &str, packages: &'a [Package]) -> Vec<&'a Package> {
    let Some(matcher) = matcher_for(packages) else {
        return Vec::new();
    };

    let mut seen: Vec<usize> = Vec::new();
    for m in matcher.re.find_iter(text) {
        if let Some(&i) = matcher.index.get(&m.as_str().to_lowercase()) {
            if !seen.contains(&i) {
                seen.push(i);
            }
        }
    }
    seen.into_iter().map(|i| &packages[i]).collect()
}

pub fn resolve_package<'a>(text: &str, packages: &'a [Package]) -> Option<&'a Package> {
    match mentioned_packages(text, packages).as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

pub fn of_type(packages: &[Package], package_type: PackageType) -> Vec<&Package> {
    packages
        .iter()
        .filter(|p| p.package_type == package_type)
        .collect()
}

#[cfg(test)]
pub(crate) fn sample_catalog() -> Vec<Package> {
    use crate::models::PackageFeatures;

    let package = |name: &str, package_type, price: f64, duration: &str| Package {
        name: name.to_string(),
        package_type,
        price,
        deposit: (price * 0.3).round(),
        duration: duration.to_string(),
        features: PackageFeatures {
            makeup: price >= 300.0,
            outfits: if price >= 300.0 { 3 } else { 1 },
            ..Default::default()
        },
        notes: String::new(),
    };
    vec![
        package("Silver Package", PackageType::Studio, 200.0, "1 hr"),
        package("Gold Package", PackageType::Studio, 350.0, "1 hr 30 min"),
        package("VIP Package", PackageType::Studio, 500.0, "2 hrs"),
        package("VVIP Package", PackageType::Studio, 800.0, "3 hrs"),
        package("Garden Package", PackageType::Outdoor, 400.0, "2 hrs"),
    ]
}
