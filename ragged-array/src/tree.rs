use std::fmt::{self};

use humansize::{DECIMAL, format_size};

use crate::content::Content;

impl Content {
    /// An indented view of the layout, one node per line with its buffers and their sizes.
    pub fn tree_display(&self) -> impl fmt::Display + '_ {
        TreeDisplayWrapper(self)
    }

    fn children_names(&self) -> Vec<String> {
        match self {
            Content::Record(a) => a.fields(),
            Content::Union(a) => (0..a.num_contents()).map(|i| format!("content{i}")).collect(),
            other => vec!["content".to_string(); other.children().len()],
        }
    }
}

struct TreeDisplayWrapper<'a>(&'a Content);

impl fmt::Display for TreeDisplayWrapper<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut content_fmt = TreeFormatter {
            fmt,
            indent: "".to_string(),
            total_size: None,
        };
        content_fmt.format("root", self.0)
    }
}

pub struct TreeFormatter<'a, 'b: 'a> {
    fmt: &'a mut fmt::Formatter<'b>,
    indent: String,
    total_size: Option<usize>,
}

impl<'a, 'b: 'a> TreeFormatter<'a, 'b> {
    fn format(&mut self, name: &str, content: &Content) -> fmt::Result {
        let nbytes = content.nbytes();
        let total_size = self.total_size.unwrap_or(nbytes);
        writeln!(
            self,
            "{}: {} len={} nbytes={} ({:.2}%)",
            name,
            content.class_name(),
            content.length(),
            format_size(nbytes, DECIMAL),
            percent(nbytes, total_size)
        )?;

        self.indent(|i| {
            if !content.parameters().is_empty() {
                writeln!(i, "parameters: {}", content.parameters())?;
            }
            for (role, data) in content.buffers() {
                let size = data.values().map_or(0, |values| values.nbytes());
                writeln!(
                    i,
                    "{} ({}): {} ({:.2}%)",
                    role,
                    data.ptype(),
                    format_size(size, DECIMAL),
                    percent(size, nbytes)
                )?;
            }
            Ok(())
        })?;

        let old_total_size = self.total_size;
        self.total_size = Some(nbytes);
        self.indent(|i| {
            for (name, child) in content
                .children_names()
                .into_iter()
                .zip(content.children())
            {
                i.format(&name, child)?;
            }
            Ok(())
        })?;

        self.total_size = old_total_size;
        Ok(())
    }

    fn indent<F>(&mut self, indented: F) -> fmt::Result
    where
        F: FnOnce(&mut TreeFormatter) -> fmt::Result,
    {
        let original_ident = self.indent.clone();
        self.indent += "  ";
        let res = indented(self);
        self.indent = original_ident;
        res
    }

    fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> fmt::Result {
        write!(self.fmt, "{}{}", self.indent, fmt)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100_f64 * part as f64 / whole as f64
    }
}

#[cfg(test)]
mod test {
    use ragged_buffer::buffer;
    use ragged_dtype::Parameters;

    use crate::content::{
        Content, IndexedOptionArray, ListOffsetArray, NumpyArray, RecordArray,
    };
    use crate::index::Index;

    #[test]
    fn nested_lists() {
        let option = IndexedOptionArray::try_new(
            Index::from_i64s([0, -1, 1, 2]),
            NumpyArray::new(buffer![1i64, 3, 4]),
        )
        .unwrap();
        let lists: Content = ListOffsetArray::try_new(Index::from_i64s([0, 3, 3, 4]), option)
            .unwrap()
            .into();
        assert_eq!(
            lists.tree_display().to_string(),
            "root: ListOffsetArray len=3 nbytes=88 B (100.00%)
  offsets (int64): 32 B (36.36%)
  content: IndexedOptionArray len=4 nbytes=56 B (63.64%)
    index (int64): 32 B (57.14%)
    content: NumpyArray len=3 nbytes=24 B (42.86%)
      data (int64): 24 B (100.00%)
"
        );
    }

    #[test]
    fn records_name_their_fields() {
        let record: Content = RecordArray::try_new(
            vec![
                NumpyArray::new(buffer![1u8, 2]).into(),
                NumpyArray::new(buffer![1.5f32, 2.5]).into(),
            ],
            Some(vec!["x".to_string(), "y".to_string()]),
            None,
        )
        .unwrap()
        .with_parameters(Parameters::empty().with("__record__", "Point"))
        .into();
        let shown = record.tree_display().to_string();
        assert!(shown.starts_with("root: RecordArray len=2 nbytes=10 B (100.00%)\n"));
        assert!(shown.contains("  parameters: {\"__record__\":\"Point\"}\n"));
        assert!(shown.contains("  x: NumpyArray len=2 nbytes=2 B (20.00%)\n"));
        assert!(shown.contains("  y: NumpyArray len=2 nbytes=8 B (80.00%)\n"));
    }
}
