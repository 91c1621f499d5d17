mod handlers_test;
