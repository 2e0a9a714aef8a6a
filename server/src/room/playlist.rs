/// A party's song queue, as song ids in play order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Playlist {
    songs: Vec<i64>,
}

impl Playlist {
    pub fn add(&mut self, song: i64) {
        self.songs.push(song);
    }

    /// Remove the first occurrence of `song`. Returns false if it was not queued.
    pub fn remove(&mut self, song: i64) -> bool {
        match self.songs.iter().position(|&s| s == song) {
            Some(index) => {
                self.songs.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn songs(&self) -> &[i64] {
        &self.songs
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}
