//! Reporting tree of everything a run produced
//!
//! The tree is append-only: charts are root branches, each holding its
//! packaged archive leaf, an optional `chart` branch listing raw files and
//! an optional `images` branch listing saved image archives.

use std::fmt;

use crate::image::ImageReference;

/// Label of the branch listing raw chart files
pub const FILES_BRANCH: &str = "chart";
/// Label of the branch listing image archives
pub const IMAGES_BRANCH: &str = "images";

/// One node of the report tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportNode {
    value: String,
    children: Vec<ReportNode>,
}

impl ReportNode {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            children: Vec::new(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn children(&self) -> &[ReportNode] {
        &self.children
    }

    /// Child values in insertion order
    pub fn child_values(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.value.as_str()).collect()
    }

    pub fn find(&self, value: &str) -> Option<&ReportNode> {
        self.children.iter().find(|c| c.value == value)
    }

    /// Add a leaf unless an identical sibling already exists
    pub fn add_node(&mut self, value: impl Into<String>) {
        let value = value.into();
        if self.find(&value).is_none() {
            self.children.push(ReportNode::new(value));
        }
    }

    /// Return the child branch named `value`, creating it if needed
    pub fn branch(&mut self, value: &str) -> &mut ReportNode {
        let idx = match self.children.iter().position(|c| c.value == value) {
            Some(idx) => idx,
            None => {
                self.children.push(ReportNode::new(value));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    fn render(&self, prefix: &str, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            let (connector, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            writeln!(out, "{}{}{}", prefix, connector, child.value)?;
            child.render(&format!("{}{}", prefix, indent), out)?;
        }
        Ok(())
    }
}

/// Run-scoped record of produced artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTree {
    root: ReportNode,
}

impl Default for ReportTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportTree {
    pub fn new() -> Self {
        Self {
            root: ReportNode::new("."),
        }
    }

    pub fn root(&self) -> &ReportNode {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Chart names in the order they were first recorded
    pub fn charts(&self) -> Vec<&str> {
        self.root.child_values()
    }

    pub fn chart(&self, name: &str) -> Option<&ReportNode> {
        self.root.find(name)
    }

    /// Branch for `chart`; recording the same chart twice reuses it
    pub fn chart_branch(&mut self, chart: &str) -> &mut ReportNode {
        self.root.branch(chart)
    }

    /// Record the packaged archive of a chart
    pub fn add_archive(&mut self, chart: &str, archive_name: &str) {
        self.chart_branch(chart).add_node(archive_name);
    }

    /// Record the raw files of a chart
    pub fn add_files<'a, I>(&mut self, chart: &str, paths: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let branch = self.chart_branch(chart).branch(FILES_BRANCH);
        for path in paths {
            branch.add_node(path);
        }
    }

    /// Record the image archives of a chart, kept unique
    ///
    /// New leaves are ordered by reference; leaves already in the branch
    /// never move.
    pub fn add_images(&mut self, chart: &str, images: &[ImageReference]) {
        let branch = self.chart_branch(chart).branch(IMAGES_BRANCH);
        let mut sorted: Vec<&ImageReference> = images.iter().collect();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for image in sorted {
            branch.add_node(image_leaf(image));
        }
    }

    /// Image references recorded under `chart`, in display order
    pub fn images(&self, chart: &str) -> Vec<&str> {
        self.chart(chart)
            .and_then(|c| c.find(IMAGES_BRANCH))
            .map(|b| b.child_values())
            .unwrap_or_default()
    }
}

/// Leaf text for a saved image: `<archive> (<reference>)`
pub fn image_leaf(image: &ImageReference) -> String {
    format!("{} ({})", image.archive_name(), image)
}

impl fmt::Display for ReportTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.root.value)?;
        self.root.render("", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_branch_is_reused() {
        let mut tree = ReportTree::new();
        tree.add_archive("nginx", "nginx-1.0.0.tgz");
        tree.add_archive("nginx", "nginx-1.0.0.tgz");
        tree.add_archive("apache", "apache-10.2.3.tgz");

        assert_eq!(tree.charts(), vec!["nginx", "apache"]);
        assert_eq!(
            tree.chart("nginx").unwrap().child_values(),
            vec!["nginx-1.0.0.tgz"]
        );
    }

    #[test]
    fn test_images_unique_and_existing_leaves_stay_put() {
        let mut tree = ReportTree::new();
        tree.add_images("demo", &[ImageReference::new("redis:7")]);
        tree.add_images(
            "demo",
            &[
                ImageReference::new("redis:7"),
                ImageReference::new("postgres:16"),
                ImageReference::new("nginx:1.25"),
            ],
        );

        assert_eq!(
            tree.images("demo"),
            vec![
                "redis-7.tar (redis:7)",
                "nginx-1.25.tar (nginx:1.25)",
                "postgres-16.tar (postgres:16)",
            ]
        );
    }

    #[test]
    fn test_images_ordered_by_reference() {
        let mut tree = ReportTree::new();
        tree.add_images(
            "demo",
            &[ImageReference::new("b/alpha:1"), ImageReference::new("a/zeta:1")],
        );

        assert_eq!(
            tree.images("demo"),
            vec!["zeta-1.tar (a/zeta:1)", "alpha-1.tar (b/alpha:1)"]
        );
    }

    #[test]
    fn test_render() {
        let mut tree = ReportTree::new();
        tree.add_archive("apache", "apache-10.2.3.tgz");
        tree.add_files("apache", ["Chart.yaml", "values.yaml"]);
        tree.add_archive("nginx", "nginx-1.0.0.tgz");
        tree.add_images("nginx", &[ImageReference::new("nginx:1.25")]);

        let expected = "\
.
├── apache
│   ├── apache-10.2.3.tgz
│   └── chart
│       ├── Chart.yaml
│       └── values.yaml
└── nginx
    ├── nginx-1.0.0.tgz
    └── images
        └── nginx-1.25.tar (nginx:1.25)
";
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn test_empty_tree() {
        let tree = ReportTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.to_string(), ".\n");
        assert!(tree.images("missing").is_empty());
    }
}
